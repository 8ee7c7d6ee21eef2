//! Procedure syntax tree consumed by the engine
//!
//! All nodes of a translation unit live in one [`Program`] arena and are
//! addressed by [`StmtId`]. Expressions are statements here, so the same id
//! type keys CFG elements, expression storage locations and the
//! statement-environment index.

use std::fmt;

/// Identity of a statement or expression node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StmtId(pub u32);

impl fmt::Display for StmtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a variable declaration (local, parameter or global)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeclId(pub u32);

/// Identity of a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionId(pub u32);

/// Static type of a declaration or expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    Int,
    Pointer(Box<Type>),
    Record(RecordType),
    Unknown,
}

impl Type {
    pub fn pointer_to(pointee: Type) -> Self {
        Type::Pointer(Box::new(pointee))
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Type::Record(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    /// Pointee type, `Unknown` for non-pointers
    pub fn pointee(&self) -> Type {
        match self {
            Type::Pointer(inner) => *inner.clone(),
            _ => Type::Unknown,
        }
    }

    /// Type of a named field, `Unknown` if this is not a record or has no such field
    pub fn field_type(&self, name: &str) -> Type {
        match self {
            Type::Record(record) => record
                .fields
                .iter()
                .find(|f| f.name == name)
                .map_or(Type::Unknown, |f| f.ty.clone()),
            _ => Type::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<Field>,
}

impl RecordType {
    pub fn new(name: impl Into<String>, fields: Vec<(&str, Type)>) -> Self {
        Self {
            name: name.into(),
            fields: fields
                .into_iter()
                .map(|(name, ty)| Field {
                    name: name.to_string(),
                    ty,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Literal {
    Int(i64),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// The comparison that holds exactly when this one does not
    pub fn negate(self) -> Option<BinaryOp> {
        Some(match self {
            BinaryOp::Eq => BinaryOp::Ne,
            BinaryOp::Ne => BinaryOp::Eq,
            BinaryOp::Lt => BinaryOp::Ge,
            BinaryOp::Le => BinaryOp::Gt,
            BinaryOp::Gt => BinaryOp::Le,
            BinaryOp::Ge => BinaryOp::Lt,
            _ => return None,
        })
    }

    /// The comparison with operands swapped (`a < b` is `b > a`)
    pub fn swap(self) -> Option<BinaryOp> {
        Some(match self {
            BinaryOp::Eq => BinaryOp::Eq,
            BinaryOp::Ne => BinaryOp::Ne,
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Le => BinaryOp::Ge,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::Ge => BinaryOp::Le,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Direct(FunctionId),
    /// Call through a function-pointer expression; always opaque
    Indirect(StmtId),
}

/// Shape of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    Decl {
        decl: DeclId,
        init: Option<StmtId>,
    },
    Return(Option<StmtId>),
    If {
        cond: StmtId,
        then_branch: Vec<StmtId>,
        else_branch: Vec<StmtId>,
    },
    While {
        cond: StmtId,
        body: Vec<StmtId>,
    },
    Block(Vec<StmtId>),
    Break,
    Continue,
    Literal(Literal),
    DeclRef(DeclId),
    Paren(StmtId),
    /// Full-expression wrapper carrying temporary-destruction scaffolding
    ExprWithCleanups(StmtId),
    Unary {
        op: UnaryOp,
        operand: StmtId,
    },
    Binary {
        op: BinaryOp,
        lhs: StmtId,
        rhs: StmtId,
    },
    Logical {
        op: LogicalOp,
        lhs: StmtId,
        rhs: StmtId,
    },
    Conditional {
        cond: StmtId,
        then_expr: StmtId,
        else_expr: StmtId,
    },
    AddrOf(StmtId),
    Deref(StmtId),
    Member {
        base: StmtId,
        field: String,
    },
    Assign {
        target: StmtId,
        value: StmtId,
    },
    CompoundAssign {
        op: BinaryOp,
        target: StmtId,
        value: StmtId,
    },
    Call {
        callee: Callee,
        args: Vec<StmtId>,
    },
    /// Aggregate initializer for a record, field by field
    InitList(Vec<(String, StmtId)>),
    /// A construct the engine has no model for (inline asm, throw, ...)
    Opaque(String),
}

impl StmtKind {
    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            StmtKind::Decl { .. } => "Decl",
            StmtKind::Return(_) => "Return",
            StmtKind::If { .. } => "If",
            StmtKind::While { .. } => "While",
            StmtKind::Block(_) => "Block",
            StmtKind::Break => "Break",
            StmtKind::Continue => "Continue",
            StmtKind::Literal(_) => "Literal",
            StmtKind::DeclRef(_) => "DeclRef",
            StmtKind::Paren(_) => "Paren",
            StmtKind::ExprWithCleanups(_) => "ExprWithCleanups",
            StmtKind::Unary { .. } => "Unary",
            StmtKind::Binary { .. } => "Binary",
            StmtKind::Logical { .. } => "Logical",
            StmtKind::Conditional { .. } => "Conditional",
            StmtKind::AddrOf(_) => "AddrOf",
            StmtKind::Deref(_) => "Deref",
            StmtKind::Member { .. } => "Member",
            StmtKind::Assign { .. } => "Assign",
            StmtKind::CompoundAssign { .. } => "CompoundAssign",
            StmtKind::Call { .. } => "Call",
            StmtKind::InitList(_) => "InitList",
            StmtKind::Opaque(_) => "Opaque",
        }
    }

    /// Whether the CFG splits this expression's operands into separate blocks
    pub fn spans_blocks(&self) -> bool {
        matches!(self, StmtKind::Logical { .. } | StmtKind::Conditional { .. })
    }

    /// Direct sub-expressions in evaluation order.
    ///
    /// Structured statements (`If`, `While`, `Block`) report no children: the
    /// CFG builder lowers them to blocks instead.
    pub fn children(&self) -> Vec<StmtId> {
        match self {
            StmtKind::Decl { init, .. } => init.iter().copied().collect(),
            StmtKind::Return(value) => value.iter().copied().collect(),
            StmtKind::Paren(e)
            | StmtKind::ExprWithCleanups(e)
            | StmtKind::AddrOf(e)
            | StmtKind::Deref(e) => vec![*e],
            StmtKind::Unary { operand, .. } => vec![*operand],
            StmtKind::Binary { lhs, rhs, .. } | StmtKind::Logical { lhs, rhs, .. } => vec![*lhs, *rhs],
            StmtKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => vec![*cond, *then_expr, *else_expr],
            StmtKind::Member { base, .. } => vec![*base],
            StmtKind::Assign { target, value } | StmtKind::CompoundAssign { target, value, .. } => {
                vec![*value, *target]
            }
            StmtKind::Call { callee, args } => {
                let mut children = Vec::with_capacity(args.len() + 1);
                if let Callee::Indirect(f) = callee {
                    children.push(*f);
                }
                children.extend(args.iter().copied());
                children
            }
            StmtKind::InitList(fields) => fields.iter().map(|(_, e)| *e).collect(),
            StmtKind::If { .. }
            | StmtKind::While { .. }
            | StmtKind::Block(_)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Literal(_)
            | StmtKind::DeclRef(_)
            | StmtKind::Opaque(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub ty: Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclStorage {
    Local,
    Param,
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decl {
    pub name: String,
    pub ty: Type,
    pub storage: DeclStorage,
}

impl Decl {
    pub fn is_global(&self) -> bool {
        self.storage == DeclStorage::Global
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub params: Vec<DeclId>,
    pub ret_ty: Type,
    /// `None` for functions that are only declared; calls to them are opaque
    pub body: Option<Vec<StmtId>>,
}

/// Arena owning every node, declaration and function of a translation unit
#[derive(Debug, Clone, Default)]
pub struct Program {
    stmts: Vec<Stmt>,
    decls: Vec<Decl>,
    functions: Vec<Function>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node for `id`. Ids are only minted by this program, so lookups are total.
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0 as usize]
    }

    pub fn kind(&self, id: StmtId) -> &StmtKind {
        &self.stmt(id).kind
    }

    pub fn ty(&self, id: StmtId) -> &Type {
        &self.stmt(id).ty
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.0 as usize]
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| FunctionId(i as u32))
    }

    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FunctionId(i as u32), f))
    }

    pub fn globals(&self) -> impl Iterator<Item = (DeclId, &Decl)> {
        self.decls
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_global())
            .map(|(i, d)| (DeclId(i as u32), d))
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    pub fn add_stmt(&mut self, kind: StmtKind, ty: Type) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(Stmt { kind, ty });
        id
    }

    pub fn add_decl(&mut self, name: impl Into<String>, ty: Type, storage: DeclStorage) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        self.decls.push(Decl {
            name: name.into(),
            ty,
            storage,
        });
        id
    }

    pub fn add_function(&mut self, function: Function) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    pub fn local(&mut self, name: impl Into<String>, ty: Type) -> DeclId {
        self.add_decl(name, ty, DeclStorage::Local)
    }

    pub fn param(&mut self, name: impl Into<String>, ty: Type) -> DeclId {
        self.add_decl(name, ty, DeclStorage::Param)
    }

    pub fn global(&mut self, name: impl Into<String>, ty: Type) -> DeclId {
        self.add_decl(name, ty, DeclStorage::Global)
    }

    pub fn define_function(
        &mut self,
        name: impl Into<String>,
        params: Vec<DeclId>,
        ret_ty: Type,
        body: Vec<StmtId>,
    ) -> FunctionId {
        self.add_function(Function {
            name: name.into(),
            params,
            ret_ty,
            body: Some(body),
        })
    }

    pub fn declare_function(&mut self, name: impl Into<String>, params: Vec<DeclId>, ret_ty: Type) -> FunctionId {
        self.add_function(Function {
            name: name.into(),
            params,
            ret_ty,
            body: None,
        })
    }

    /// Attach a body to a function created with [`Program::declare_function`],
    /// which is how recursive functions are built.
    pub fn set_body(&mut self, function: FunctionId, body: Vec<StmtId>) {
        self.functions[function.0 as usize].body = Some(body);
    }

    // Expression builders. Each computes the node type from its operands.

    pub fn int(&mut self, value: i64) -> StmtId {
        self.add_stmt(StmtKind::Literal(Literal::Int(value)), Type::Int)
    }

    pub fn bool_lit(&mut self, value: bool) -> StmtId {
        self.add_stmt(StmtKind::Literal(Literal::Bool(value)), Type::Bool)
    }

    pub fn null(&mut self, pointee: Type) -> StmtId {
        self.add_stmt(StmtKind::Literal(Literal::Null), Type::pointer_to(pointee))
    }

    pub fn var(&mut self, decl: DeclId) -> StmtId {
        let ty = self.decl(decl).ty.clone();
        self.add_stmt(StmtKind::DeclRef(decl), ty)
    }

    pub fn paren(&mut self, inner: StmtId) -> StmtId {
        let ty = self.ty(inner).clone();
        self.add_stmt(StmtKind::Paren(inner), ty)
    }

    pub fn with_cleanups(&mut self, inner: StmtId) -> StmtId {
        let ty = self.ty(inner).clone();
        self.add_stmt(StmtKind::ExprWithCleanups(inner), ty)
    }

    pub fn unary(&mut self, op: UnaryOp, operand: StmtId) -> StmtId {
        let ty = match op {
            UnaryOp::Not => Type::Bool,
            UnaryOp::Neg | UnaryOp::BitNot => Type::Int,
        };
        self.add_stmt(StmtKind::Unary { op, operand }, ty)
    }

    pub fn not(&mut self, operand: StmtId) -> StmtId {
        self.unary(UnaryOp::Not, operand)
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: StmtId, rhs: StmtId) -> StmtId {
        let ty = if op.is_comparison() { Type::Bool } else { Type::Int };
        self.add_stmt(StmtKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn and(&mut self, lhs: StmtId, rhs: StmtId) -> StmtId {
        self.add_stmt(
            StmtKind::Logical {
                op: LogicalOp::And,
                lhs,
                rhs,
            },
            Type::Bool,
        )
    }

    pub fn or(&mut self, lhs: StmtId, rhs: StmtId) -> StmtId {
        self.add_stmt(
            StmtKind::Logical {
                op: LogicalOp::Or,
                lhs,
                rhs,
            },
            Type::Bool,
        )
    }

    pub fn conditional(&mut self, cond: StmtId, then_expr: StmtId, else_expr: StmtId) -> StmtId {
        let ty = self.ty(then_expr).clone();
        self.add_stmt(
            StmtKind::Conditional {
                cond,
                then_expr,
                else_expr,
            },
            ty,
        )
    }

    pub fn addr_of(&mut self, place: StmtId) -> StmtId {
        let ty = Type::pointer_to(self.ty(place).clone());
        self.add_stmt(StmtKind::AddrOf(place), ty)
    }

    pub fn deref(&mut self, pointer: StmtId) -> StmtId {
        let ty = self.ty(pointer).pointee();
        self.add_stmt(StmtKind::Deref(pointer), ty)
    }

    pub fn member(&mut self, base: StmtId, field: &str) -> StmtId {
        let ty = self.ty(base).field_type(field);
        self.add_stmt(
            StmtKind::Member {
                base,
                field: field.to_string(),
            },
            ty,
        )
    }

    pub fn assign(&mut self, target: StmtId, value: StmtId) -> StmtId {
        let ty = self.ty(target).clone();
        self.add_stmt(StmtKind::Assign { target, value }, ty)
    }

    pub fn compound_assign(&mut self, op: BinaryOp, target: StmtId, value: StmtId) -> StmtId {
        let ty = self.ty(target).clone();
        self.add_stmt(StmtKind::CompoundAssign { op, target, value }, ty)
    }

    pub fn call(&mut self, function: FunctionId, args: Vec<StmtId>) -> StmtId {
        let ty = self.function(function).ret_ty.clone();
        self.add_stmt(
            StmtKind::Call {
                callee: Callee::Direct(function),
                args,
            },
            ty,
        )
    }

    pub fn call_indirect(&mut self, callee: StmtId, args: Vec<StmtId>, ret_ty: Type) -> StmtId {
        self.add_stmt(
            StmtKind::Call {
                callee: Callee::Indirect(callee),
                args,
            },
            ret_ty,
        )
    }

    pub fn init_list(&mut self, ty: Type, fields: Vec<(&str, StmtId)>) -> StmtId {
        let fields = fields.into_iter().map(|(name, e)| (name.to_string(), e)).collect();
        self.add_stmt(StmtKind::InitList(fields), ty)
    }

    pub fn opaque(&mut self, what: impl Into<String>) -> StmtId {
        self.add_stmt(StmtKind::Opaque(what.into()), Type::Void)
    }

    // Statement builders

    pub fn declare(&mut self, decl: DeclId, init: Option<StmtId>) -> StmtId {
        self.add_stmt(StmtKind::Decl { decl, init }, Type::Void)
    }

    pub fn return_stmt(&mut self, value: Option<StmtId>) -> StmtId {
        self.add_stmt(StmtKind::Return(value), Type::Void)
    }

    pub fn if_stmt(&mut self, cond: StmtId, then_branch: Vec<StmtId>, else_branch: Vec<StmtId>) -> StmtId {
        self.add_stmt(
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            },
            Type::Void,
        )
    }

    pub fn while_stmt(&mut self, cond: StmtId, body: Vec<StmtId>) -> StmtId {
        self.add_stmt(StmtKind::While { cond, body }, Type::Void)
    }

    pub fn block(&mut self, stmts: Vec<StmtId>) -> StmtId {
        self.add_stmt(StmtKind::Block(stmts), Type::Void)
    }

    pub fn break_stmt(&mut self) -> StmtId {
        self.add_stmt(StmtKind::Break, Type::Void)
    }

    pub fn continue_stmt(&mut self) -> StmtId {
        self.add_stmt(StmtKind::Continue, Type::Void)
    }
}
