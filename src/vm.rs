//! Virtual machine for selector matching
//!
//! Programs are Thompson NFAs over root-to-node paths: each `Predict`
//! consumes one node of the path, `Split` and `Jump` are epsilon moves. The
//! VM simulates every thread in lockstep (Pike's VM), so matching a path
//! costs O(path length × program length) with no backtracking.
//!
//! References:
//! - <http://swtch.com/~rsc/regexp/regexp2.html>
//! - <http://research.swtch.com/sparse>

use std::fmt;

use thiserror::Error;
use tracing::trace;

use crate::predicate::Predicate;
use crate::tree::{Node, NodeId, Tree};

/// VM instructions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Consume one node; the thread survives only if the predicate holds
    Predict(Predicate),
    /// Continue at both addresses
    Split(usize, usize),
    /// Continue at the address
    Jump(usize),
    /// Accept, provided the whole path has been consumed
    Match,
}

/// Error for hand-assembled programs that break the program invariants
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("Program error: program must end with a match instruction")]
    MissingMatch,

    #[error("Program error: instruction {pc} targets {target}, past the end of the program")]
    TargetOutOfRange { pc: usize, target: usize },
}

/// A compiled selector
///
/// Immutable once built; one program can be matched against any number of
/// trees, from any number of threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    /// Assemble a program by hand, checking that it ends with `Match` and
    /// that every jump target is in range
    pub fn new(instructions: Vec<Instruction>) -> Result<Self, ProgramError> {
        if instructions.last() != Some(&Instruction::Match) {
            return Err(ProgramError::MissingMatch);
        }
        let len = instructions.len();
        for (pc, inst) in instructions.iter().enumerate() {
            let targets = match inst {
                Instruction::Split(a, b) => [Some(*a), Some(*b)],
                Instruction::Jump(a) => [Some(*a), None],
                Instruction::Predict(_) | Instruction::Match => [None, None],
            };
            if let Some(target) = targets.into_iter().flatten().find(|&t| t >= len) {
                return Err(ProgramError::TargetOutOfRange { pc, target });
            }
        }
        Ok(Self { instructions })
    }

    /// Wrap code produced by the compiler, which upholds the invariants by
    /// construction
    pub(crate) fn from_compiled(instructions: Vec<Instruction>) -> Self {
        debug_assert!(
            Program::new(instructions.clone()).is_ok(),
            "Compiler bug: malformed program"
        );
        Self { instructions }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Does the program accept this exact root-to-node path?
    pub fn matches_path(&self, path: &[&Node]) -> bool {
        VM::new(self).matches(path)
    }

    /// Match every node in the subtree under `root`, `root` included, and
    /// return the accepted nodes in pre-order. Paths start at `root`.
    pub fn select(&self, tree: &Tree, root: NodeId) -> Vec<NodeId> {
        VM::new(self).select(tree, root)
    }

    /// [`Program::select`] over every top-level node of the tree, in order
    pub fn select_all(&self, tree: &Tree) -> Vec<NodeId> {
        let mut vm = VM::new(self);
        tree.roots()
            .iter()
            .flat_map(|&root| vm.select(tree, root))
            .collect()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pc, inst) in self.instructions.iter().enumerate() {
            match inst {
                Instruction::Predict(pred) => writeln!(f, "{:04} predict {}", pc, pred)?,
                Instruction::Split(a, b) => writeln!(f, "{:04} split {}, {}", pc, a, b)?,
                Instruction::Jump(a) => writeln!(f, "{:04} jump {}", pc, a)?,
                Instruction::Match => writeln!(f, "{:04} match", pc)?,
            }
        }
        Ok(())
    }
}

/// Duplicate-free set of program counters
///
/// `dense` lists the members in insertion order; `stamps[pc]` equals the
/// current generation iff `pc` is a member, so clearing only bumps the
/// generation.
#[derive(Debug)]
struct Threads {
    dense: Vec<usize>,
    stamps: Vec<u32>,
    generation: u32,
}

impl Threads {
    fn new(size: usize) -> Self {
        Self {
            dense: Vec::with_capacity(size),
            stamps: vec![0; size],
            generation: 1,
        }
    }

    #[inline]
    fn add(&mut self, pc: usize) {
        if !self.contains(pc) {
            self.stamps[pc] = self.generation;
            self.dense.push(pc);
        }
    }

    #[inline]
    fn contains(&self, pc: usize) -> bool {
        self.stamps[pc] == self.generation
    }

    fn clear(&mut self) {
        self.dense.clear();
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            self.stamps.fill(0);
            self.generation = 1;
        }
    }

    fn len(&self) -> usize {
        self.dense.len()
    }

    fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }
}

/// Matching state for one program
///
/// Holds the two thread sets; they are reused for every path matched
/// through the same VM.
pub struct VM<'p> {
    program: &'p Program,
    active: Threads,
    next: Threads,
}

impl<'p> VM<'p> {
    pub fn new(program: &'p Program) -> Self {
        let size = program.len();
        Self {
            program,
            active: Threads::new(size),
            next: Threads::new(size),
        }
    }

    /// Does the program accept exactly this path?
    ///
    /// Every node must be consumed by a `Predict`, in order, and a `Match`
    /// must then be reachable through epsilon moves alone. A thread that
    /// reaches `Match` while nodes remain does not accept.
    pub fn matches(&mut self, path: &[&Node]) -> bool {
        let program: &'p [Instruction] = self.program.instructions();
        if program.is_empty() {
            return false;
        }

        self.active.clear();
        self.next.clear();
        self.active.add(0);

        for (depth, node) in path.iter().enumerate() {
            // The set grows while it is scanned: epsilon targets are added
            // to the same step
            let mut i = 0;
            while i < self.active.len() {
                let pc = self.active.dense[i];
                i += 1;
                match &program[pc] {
                    Instruction::Predict(pred) => {
                        if pred.test(node) {
                            self.next.add(pc + 1);
                        }
                    }
                    Instruction::Match => {}
                    Instruction::Jump(a) => self.active.add(*a),
                    Instruction::Split(a, b) => {
                        self.active.add(*a);
                        self.active.add(*b);
                    }
                }
            }

            std::mem::swap(&mut self.active, &mut self.next);
            self.next.clear();

            if self.active.is_empty() {
                trace!(depth, tag = %node.tag, "no thread survived");
                return false;
            }
        }

        self.accepts()
    }

    /// Epsilon closure of the active set after the last node: is `Match`
    /// reachable?
    fn accepts(&mut self) -> bool {
        let program: &'p [Instruction] = self.program.instructions();
        let mut i = 0;
        while i < self.active.len() {
            let pc = self.active.dense[i];
            i += 1;
            match &program[pc] {
                Instruction::Match => return true,
                Instruction::Jump(a) => self.active.add(*a),
                Instruction::Split(a, b) => {
                    self.active.add(*a);
                    self.active.add(*b);
                }
                Instruction::Predict(_) => {}
            }
        }
        false
    }

    /// Match every node under `root` against its path from `root`, collecting
    /// accepted nodes in pre-order
    ///
    /// The walk keeps an explicit stack of `(node, depth)` pairs, so tree
    /// depth is bounded by memory rather than by the call stack.
    pub fn select(&mut self, tree: &Tree, root: NodeId) -> Vec<NodeId> {
        let mut path: Vec<&Node> = Vec::new();
        let mut result = Vec::new();
        let mut stack = vec![(root, 0)];

        while let Some((id, depth)) = stack.pop() {
            let Some(node) = tree.get_node(id) else {
                continue;
            };

            path.truncate(depth);
            path.push(node);
            if self.matches(&path) {
                trace!(node = id, "matched");
                result.push(id);
            }
            // Reversed so the leftmost child is visited first
            stack.extend(node.children.iter().rev().map(|&child| (child, depth + 1)));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str) -> Instruction {
        Instruction::Predict(Predicate::Tag(name.to_string()))
    }

    fn nodes(tags: &[&str]) -> Vec<Node> {
        tags.iter().map(|t| Node::new(t)).collect()
    }

    fn matches(program: &Program, tags: &[&str]) -> bool {
        let nodes = nodes(tags);
        let path: Vec<&Node> = nodes.iter().collect();
        program.matches_path(&path)
    }

    /// html -> (head -> title, body -> (div -> p, div))
    fn create_test_tree() -> Tree {
        let mut tree = Tree::new();
        let html = tree.add_node(Node::new("html"));
        let head = tree.append_child(html, Node::new("head")).unwrap();
        tree.append_child(head, Node::new("title")).unwrap();
        let body = tree.append_child(html, Node::new("body")).unwrap();
        let div = tree.append_child(body, Node::new("div")).unwrap();
        tree.append_child(div, Node::new("p")).unwrap();
        tree.append_child(body, Node::new("div")).unwrap();
        tree
    }

    #[test]
    fn test_sequence() {
        let program = Program::new(vec![tag("html"), tag("body"), tag("div"), Instruction::Match])
            .unwrap();

        assert!(matches(&program, &["html", "body", "div"]));
        assert!(!matches(&program, &["html", "body"]));
        assert!(!matches(&program, &["html", "body", "div", "p"]));
        assert!(!matches(&program, &["html", "head", "div"]));
    }

    #[test]
    fn test_sequence_select() {
        let program = Program::new(vec![tag("html"), tag("body"), tag("div"), Instruction::Match])
            .unwrap();
        let tree = create_test_tree();

        let result = program.select(&tree, 0);
        assert_eq!(result, vec![4, 6]);
        for id in result {
            assert_eq!(tree.tag_path(id), vec!["html", "body", "div"]);
        }
    }

    #[test]
    fn test_or() {
        // html (head|body)
        let program = Program::new(vec![
            tag("html"),
            Instruction::Split(2, 4),
            tag("head"),
            Instruction::Jump(5),
            tag("body"),
            Instruction::Match,
        ])
        .unwrap();
        let tree = create_test_tree();

        assert_eq!(program.select(&tree, 0), vec![1, 3]);
    }

    #[test]
    fn test_star_allows_zero() {
        // a* b
        let program = Program::new(vec![
            Instruction::Split(1, 3),
            tag("a"),
            Instruction::Jump(0),
            tag("b"),
            Instruction::Match,
        ])
        .unwrap();

        assert!(matches(&program, &["b"]));
        assert!(matches(&program, &["a", "a", "a", "b"]));
        assert!(!matches(&program, &["a", "a"]));
        assert!(!matches(&program, &["a", "x", "b"]));
    }

    #[test]
    fn test_empty_path() {
        let star = Program::new(vec![
            Instruction::Split(1, 3),
            tag("a"),
            Instruction::Jump(0),
            Instruction::Match,
        ])
        .unwrap();
        let single = Program::new(vec![tag("a"), Instruction::Match]).unwrap();

        assert!(star.matches_path(&[]));
        assert!(!single.matches_path(&[]));
    }

    #[test]
    fn test_match_before_path_end_does_not_accept() {
        let program = Program::new(vec![tag("a"), Instruction::Match]).unwrap();

        assert!(matches(&program, &["a"]));
        assert!(!matches(&program, &["a", "a"]));
    }

    #[test]
    fn test_nullable_loop_terminates() {
        // (a*)* has an epsilon cycle; the thread set must cut it
        let program = Program::new(vec![
            Instruction::Split(1, 5),
            Instruction::Split(2, 4),
            tag("a"),
            Instruction::Jump(1),
            Instruction::Jump(0),
            Instruction::Match,
        ])
        .unwrap();

        assert!(matches(&program, &[]));
        assert!(matches(&program, &["a", "a"]));
        assert!(!matches(&program, &["b"]));
    }

    #[test]
    fn test_vm_reuse_across_paths() {
        let program = Program::new(vec![tag("a"), tag("b"), Instruction::Match]).unwrap();
        let mut vm = VM::new(&program);
        let ab = nodes(&["a", "b"]);
        let ac = nodes(&["a", "c"]);

        assert!(vm.matches(&[&ab[0], &ab[1]]));
        assert!(!vm.matches(&[&ac[0], &ac[1]]));
        assert!(vm.matches(&[&ab[0], &ab[1]]));
    }

    #[test]
    fn test_select_starts_paths_at_root() {
        let program = Program::new(vec![tag("body"), tag("div"), Instruction::Match]).unwrap();
        let tree = create_test_tree();

        assert!(program.select(&tree, 0).is_empty());
        assert_eq!(program.select(&tree, 3), vec![4, 6]);
    }

    #[test]
    fn test_select_all_visits_every_root() {
        let program = Program::new(vec![tag("a"), Instruction::Match]).unwrap();
        let mut tree = Tree::new();
        let first = tree.add_node(Node::new("a"));
        tree.append_child(first, Node::new("a")).unwrap();
        let second = tree.add_node(Node::new("a"));

        assert_eq!(program.select_all(&tree), vec![first, second]);
    }

    #[test]
    fn test_select_deep_chain() {
        let program = Program::new(vec![tag("a"), tag("a"), Instruction::Match]).unwrap();
        let mut tree = Tree::new();
        let mut id = tree.add_node(Node::new("a"));
        for _ in 1..20_000 {
            id = tree.append_child(id, Node::new("a")).unwrap();
        }

        assert_eq!(program.select_all(&tree), vec![1]);
    }

    #[test]
    fn test_select_restores_path_between_siblings() {
        // html -> (head -> title, body -> ...): body must not see head on its path
        let program = Program::new(vec![tag("html"), tag("body"), Instruction::Match]).unwrap();
        let tree = create_test_tree();

        assert_eq!(program.select(&tree, 0), vec![3]);
    }

    #[test]
    fn test_threads_dedup_and_clear() {
        let mut threads = Threads::new(4);
        threads.add(2);
        threads.add(0);
        threads.add(2);

        assert_eq!(threads.dense, vec![2, 0]);
        assert!(threads.contains(0));
        assert!(!threads.contains(1));

        threads.clear();
        assert!(threads.is_empty());
        assert!(!threads.contains(2));
        threads.add(2);
        assert_eq!(threads.dense, vec![2]);
    }

    #[test]
    fn test_threads_generation_wrap() {
        let mut threads = Threads::new(2);
        threads.generation = u32::MAX;
        threads.add(1);
        threads.clear();

        assert_eq!(threads.generation, 1);
        assert!(!threads.contains(1));
    }

    #[test]
    fn test_program_validation() {
        assert_eq!(
            Program::new(vec![tag("a")]),
            Err(ProgramError::MissingMatch)
        );
        assert_eq!(Program::new(Vec::new()), Err(ProgramError::MissingMatch));
        assert_eq!(
            Program::new(vec![Instruction::Split(1, 7), Instruction::Match]),
            Err(ProgramError::TargetOutOfRange { pc: 0, target: 7 })
        );
    }

    #[test]
    fn test_display() {
        let program = Program::new(vec![
            Instruction::Split(1, 3),
            tag("a"),
            Instruction::Jump(0),
            Instruction::Match,
        ])
        .unwrap();

        assert_eq!(
            program.to_string(),
            "0000 split 1, 3\n0001 predict a\n0002 jump 0\n0003 match\n"
        );
    }
}
