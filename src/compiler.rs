//! Selector compilation to VM programs
//!
//! Selector text goes through the pest grammar, the parse tree is simplified
//! and turned into an [`Ast`], and the AST is lowered to a [`Program`] by
//! Thompson construction.

use tracing::debug;

use crate::ast::{Ast, build_ast};
use crate::parser::{CompileError, parse_selector};
use crate::vm::{Instruction, Program};

/// Compile selector text into a program
///
/// Fails with [`CompileError::Syntax`] when the selector is malformed.
pub fn compile(selector: &str) -> Result<Program, CompileError> {
    let parsed = parse_selector(selector)?.simplify();
    let ast = build_ast(&parsed, selector)?;
    let program = generate(ast);
    debug!(selector, instructions = program.len(), "compiled selector");
    Ok(program)
}

/// Lower an AST to a program, appending the final `Match`
pub fn generate(ast: Ast) -> Program {
    let mut code = emit(ast, 0);
    code.push(Instruction::Match);
    Program::from_compiled(code)
}

/// Generate code for `ast` as if it starts at address `base`
///
/// Addresses are absolute: every fragment knows where it will land, so
/// targets are computed up front instead of being patched afterwards.
fn emit(ast: Ast, base: usize) -> Vec<Instruction> {
    match ast {
        Ast::Predicate(pred) => vec![Instruction::Predict(pred)],

        Ast::Concat(left, right) => {
            let mut code = Vec::new();
            for operand in unroll(*left, *right, split_concat) {
                let part = emit(operand, base + code.len());
                code.extend(part);
            }
            code
        }

        // L1: split L2, L3
        // L2: body
        //     jump L1
        // L3:
        Ast::Star(inner) => {
            let body = emit(*inner, base + 1);
            let after = base + 1 + body.len() + 1;
            let mut code = Vec::with_capacity(body.len() + 2);
            code.push(Instruction::Split(base + 1, after));
            code.extend(body);
            code.push(Instruction::Jump(base));
            code
        }

        // L1: body
        //     split L1, L2
        // L2:
        Ast::Plus(inner) => {
            let mut code = emit(*inner, base);
            let after = base + code.len() + 1;
            code.push(Instruction::Split(base, after));
            code
        }

        //     split L1, L2
        // L1: body
        // L2:
        Ast::Option(inner) => {
            let body = emit(*inner, base + 1);
            let after = base + 1 + body.len();
            let mut code = Vec::with_capacity(body.len() + 1);
            code.push(Instruction::Split(base + 1, after));
            code.extend(body);
            code
        }

        // Or(Or(a, b), c) unrolled:
        //     split L1, L3
        //     split L2, L4
        // L2: a
        //     jump L5
        // L4: b
        //     jump L6
        // L3: c
        // L6:
        Ast::Or(left, right) => {
            let operands = unroll(*left, *right, split_or);
            let splits = operands.len() - 1;
            let mut starts = Vec::with_capacity(operands.len());
            let mut body = Vec::new();
            let mut pc = base + splits;
            for (i, operand) in operands.into_iter().enumerate() {
                if i > 0 {
                    // jump closing the operands before this one
                    pc += 1;
                }
                starts.push(pc);
                let part = emit(operand, pc);
                pc += part.len();
                if i > 0 {
                    body.push(Instruction::Jump(pc));
                }
                body.extend(part);
            }

            let mut code = Vec::with_capacity(splits + body.len());
            for i in 0..splits {
                code.push(Instruction::Split(base + i + 1, starts[splits - i]));
            }
            code.extend(body);
            code
        }
    }
}

/// Operands of a left-leaning chain of one binary node kind, in order
///
/// Walks the chain with a loop, so long lists neither recurse here nor in
/// `emit`, and the chain is taken apart node by node as it goes.
fn unroll(left: Ast, right: Ast, split: fn(Ast) -> Result<(Ast, Ast), Ast>) -> Vec<Ast> {
    let mut operands = vec![right];
    let mut current = left;
    loop {
        match split(current) {
            Ok((left, right)) => {
                operands.push(right);
                current = left;
            }
            Err(first) => {
                operands.push(first);
                break;
            }
        }
    }
    operands.reverse();
    operands
}

fn split_concat(ast: Ast) -> Result<(Ast, Ast), Ast> {
    match ast {
        Ast::Concat(left, right) => Ok((*left, *right)),
        other => Err(other),
    }
}

fn split_or(ast: Ast) -> Result<(Ast, Ast), Ast> {
    match ast {
        Ast::Or(left, right) => Ok((*left, *right)),
        other => Err(other),
    }
}
