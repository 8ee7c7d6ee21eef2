//! Control Flow Graph construction from the procedure syntax tree
//!
//! Blocks hold *elements*: statement and expression ids in evaluation order,
//! children before parents. Parenthesization and cleanup wrappers are never
//! elements. `&&`, `||` and `?:` are split into one block per operand, with
//! the whole expression placed at the head of the block where the paths
//! merge again.

use indexmap::IndexMap;
use petgraph::algo::dominators;
use petgraph::graph::{DiGraph, NodeIndex};
use smallvec::SmallVec;
use std::collections::{BTreeSet, HashSet};

use crate::ast::{FunctionId, LogicalOp, Program, StmtId, StmtKind};
use crate::elide::skip_elided;

/// Unique identifier for a basic block
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub usize);

/// How a basic block terminates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// Unconditional jump to another block
    Goto(BlockId),
    /// Conditional branch on an element of this block
    Branch {
        condition: StmtId,
        then_block: BlockId,
        else_block: BlockId,
    },
    /// Return from function (edge to the exit block)
    Return,
}

/// A basic block in the CFG
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub elements: Vec<StmtId>,
    pub terminator: Option<Terminator>,
    pub predecessors: SmallVec<[BlockId; 2]>,
    pub successors: SmallVec<[BlockId; 2]>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            elements: Vec::new(),
            terminator: None,
            predecessors: SmallVec::new(),
            successors: SmallVec::new(),
        }
    }
}

/// Control Flow Graph of one function
#[derive(Debug, Clone)]
pub struct Cfg {
    pub function: FunctionId,
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    pub exit: BlockId,
}

impl Cfg {
    pub fn new(function: FunctionId) -> Self {
        let mut cfg = Self {
            function,
            blocks: Vec::new(),
            entry: BlockId(0),
            exit: BlockId(0),
        };
        cfg.entry = cfg.new_block();
        cfg.exit = cfg.new_block();
        cfg
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(BasicBlock::new(id));
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        let block = &mut self.blocks[from.0];
        if !block.successors.contains(&to) {
            block.successors.push(to);
        }
        let block = &mut self.blocks[to.0];
        if !block.predecessors.contains(&from) {
            block.predecessors.push(from);
        }
    }

    pub fn set_terminator(&mut self, block: BlockId, terminator: Terminator) {
        self.blocks[block.0].terminator = Some(terminator);
    }

    pub fn add_element(&mut self, block: BlockId, element: StmtId) {
        self.blocks[block.0].elements.push(element);
    }

    /// Condition that holds along `from -> to`, with the polarity it has there
    pub fn edge_condition(&self, from: BlockId, to: BlockId) -> Option<(StmtId, bool)> {
        match self.block(from).terminator {
            Some(Terminator::Branch {
                condition,
                then_block,
                else_block,
            }) if then_block != else_block => {
                if to == then_block {
                    Some((condition, true))
                } else if to == else_block {
                    Some((condition, false))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Block and index of every element
    pub fn element_positions(&self) -> IndexMap<StmtId, (BlockId, usize)> {
        let mut positions = IndexMap::new();
        for block in &self.blocks {
            for (i, element) in block.elements.iter().enumerate() {
                positions.insert(*element, (block.id, i));
            }
        }
        positions
    }

    /// Get blocks in reverse postorder (useful for forward dataflow)
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut postorder = self.postorder();
        postorder.reverse();
        postorder
    }

    /// Get reachable blocks in postorder
    pub fn postorder(&self) -> Vec<BlockId> {
        let mut visited = HashSet::new();
        let mut result = Vec::new();
        self.dfs_postorder(self.entry, &mut visited, &mut result);
        result
    }

    fn dfs_postorder(&self, block: BlockId, visited: &mut HashSet<BlockId>, postorder: &mut Vec<BlockId>) {
        if !visited.insert(block) {
            return;
        }
        for &succ in &self.block(block).successors {
            self.dfs_postorder(succ, visited, postorder);
        }
        postorder.push(block);
    }

    /// Targets of back edges, i.e. blocks that dominate one of their predecessors
    pub fn loop_heads(&self) -> BTreeSet<BlockId> {
        let mut graph = DiGraph::<BlockId, ()>::with_capacity(self.blocks.len(), self.blocks.len() * 2);
        let nodes: Vec<NodeIndex> = self.blocks.iter().map(|b| graph.add_node(b.id)).collect();
        for block in &self.blocks {
            for succ in &block.successors {
                graph.add_edge(nodes[block.id.0], nodes[succ.0], ());
            }
        }

        let doms = dominators::simple_fast(&graph, nodes[self.entry.0]);
        let mut heads = BTreeSet::new();
        for block in &self.blocks {
            // Unreachable blocks have no dominators
            let Some(dominating) = doms.dominators(nodes[block.id.0]) else {
                continue;
            };
            let dominating: HashSet<NodeIndex> = dominating.collect();
            for succ in &block.successors {
                if dominating.contains(&nodes[succ.0]) {
                    heads.insert(*succ);
                }
            }
        }
        heads
    }
}

/// Builder for constructing a CFG from a function body
pub struct CfgBuilder<'p> {
    program: &'p Program,
    cfg: Cfg,
    current_block: BlockId,
    loop_stack: Vec<LoopContext>,
}

struct LoopContext {
    continue_block: BlockId,
    break_block: BlockId,
}

impl<'p> CfgBuilder<'p> {
    pub fn new(program: &'p Program, function: FunctionId) -> Self {
        let cfg = Cfg::new(function);
        let entry = cfg.entry;
        Self {
            program,
            cfg,
            current_block: entry,
            loop_stack: Vec::new(),
        }
    }

    /// Lower the function body; `None` if the function is only declared
    pub fn build(mut self) -> Option<Cfg> {
        let body = self.program.function(self.cfg.function).body.clone()?;
        self.build_body(&body);

        // Implicit return at the end of the body
        if self.is_open() {
            self.cfg.set_terminator(self.current_block, Terminator::Return);
            self.cfg.add_edge(self.current_block, self.cfg.exit);
        }
        Some(self.cfg)
    }

    fn is_open(&self) -> bool {
        self.cfg.block(self.current_block).terminator.is_none()
    }

    fn goto(&mut self, target: BlockId) {
        if self.is_open() {
            self.cfg.set_terminator(self.current_block, Terminator::Goto(target));
            self.cfg.add_edge(self.current_block, target);
        }
    }

    fn branch(&mut self, condition: StmtId, then_block: BlockId, else_block: BlockId) {
        self.cfg.set_terminator(
            self.current_block,
            Terminator::Branch {
                condition,
                then_block,
                else_block,
            },
        );
        self.cfg.add_edge(self.current_block, then_block);
        self.cfg.add_edge(self.current_block, else_block);
    }

    fn build_body(&mut self, stmts: &[StmtId]) {
        for stmt in stmts {
            self.build_stmt(*stmt);
        }
    }

    fn build_stmt(&mut self, stmt: StmtId) {
        let program = self.program;
        match program.kind(stmt) {
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.build_if(*cond, then_branch, else_branch),
            StmtKind::While { cond, body } => self.build_while(*cond, body),
            StmtKind::Block(stmts) => self.build_body(stmts),
            StmtKind::Break => {
                if let Some(target) = self.loop_stack.last().map(|ctx| ctx.break_block) {
                    self.goto(target);
                }
                self.current_block = self.cfg.new_block();
            }
            StmtKind::Continue => {
                if let Some(target) = self.loop_stack.last().map(|ctx| ctx.continue_block) {
                    self.goto(target);
                }
                self.current_block = self.cfg.new_block();
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.emit(*value);
                }
                self.cfg.add_element(self.current_block, stmt);
                self.cfg.set_terminator(self.current_block, Terminator::Return);
                self.cfg.add_edge(self.current_block, self.cfg.exit);
                // Create new unreachable block for any following statements
                self.current_block = self.cfg.new_block();
            }
            StmtKind::Decl { init, .. } => {
                if let Some(init) = init {
                    self.emit(*init);
                }
                self.cfg.add_element(self.current_block, stmt);
            }
            _ => self.emit(stmt),
        }
    }

    /// Lower an expression in evaluation order
    fn emit(&mut self, expr: StmtId) {
        let program = self.program;
        match program.kind(expr) {
            StmtKind::Paren(inner) | StmtKind::ExprWithCleanups(inner) => self.emit(*inner),
            StmtKind::Logical { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                self.emit(lhs);
                let rhs_block = self.cfg.new_block();
                let join_block = self.cfg.new_block();
                let condition = skip_elided(program, lhs);
                match op {
                    LogicalOp::And => self.branch(condition, rhs_block, join_block),
                    LogicalOp::Or => self.branch(condition, join_block, rhs_block),
                }

                self.current_block = rhs_block;
                self.emit(rhs);
                self.goto(join_block);

                self.current_block = join_block;
                self.cfg.add_element(join_block, expr);
            }
            StmtKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let (cond, then_expr, else_expr) = (*cond, *then_expr, *else_expr);
                self.emit(cond);
                let then_block = self.cfg.new_block();
                let else_block = self.cfg.new_block();
                let join_block = self.cfg.new_block();
                self.branch(skip_elided(program, cond), then_block, else_block);

                self.current_block = then_block;
                self.emit(then_expr);
                self.goto(join_block);

                self.current_block = else_block;
                self.emit(else_expr);
                self.goto(join_block);

                self.current_block = join_block;
                self.cfg.add_element(join_block, expr);
            }
            kind => {
                for child in kind.children() {
                    self.emit(child);
                }
                self.cfg.add_element(self.current_block, expr);
            }
        }
    }

    /// Lower a branch condition, short-circuiting `&&`/`||` into control flow
    fn build_condition(&mut self, cond: StmtId, then_block: BlockId, else_block: BlockId) {
        let program = self.program;
        match program.kind(cond) {
            StmtKind::Paren(inner) | StmtKind::ExprWithCleanups(inner) => {
                self.build_condition(*inner, then_block, else_block)
            }
            StmtKind::Logical { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                let rhs_block = self.cfg.new_block();
                match op {
                    LogicalOp::And => self.build_condition(lhs, rhs_block, else_block),
                    LogicalOp::Or => self.build_condition(lhs, then_block, rhs_block),
                }
                self.current_block = rhs_block;
                self.build_condition(rhs, then_block, else_block);
            }
            _ => {
                self.emit(cond);
                self.branch(cond, then_block, else_block);
            }
        }
    }

    fn build_if(&mut self, cond: StmtId, then_body: &[StmtId], else_body: &[StmtId]) {
        let then_block = self.cfg.new_block();
        let else_block = self.cfg.new_block();
        let merge_block = self.cfg.new_block();

        self.build_condition(cond, then_block, else_block);

        self.current_block = then_block;
        self.build_body(then_body);
        self.goto(merge_block);

        self.current_block = else_block;
        self.build_body(else_body);
        self.goto(merge_block);

        self.current_block = merge_block;
    }

    fn build_while(&mut self, cond: StmtId, body: &[StmtId]) {
        let header_block = self.cfg.new_block();
        let body_block = self.cfg.new_block();
        let exit_block = self.cfg.new_block();

        self.goto(header_block);
        self.current_block = header_block;
        self.build_condition(cond, body_block, exit_block);

        self.loop_stack.push(LoopContext {
            continue_block: header_block,
            break_block: exit_block,
        });
        self.current_block = body_block;
        self.build_body(body);
        self.loop_stack.pop();

        // Back edge to header
        self.goto(header_block);

        self.current_block = exit_block;
    }
}
