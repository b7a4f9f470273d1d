//! Fixtures shared by the unit tests.

use std::sync::Arc;

use crate::{
    analysis::{bytecode::MethodCode, dataflow::solve, normalize::normalize},
    assembly::InstructionAssembler,
    metadata::{
        method::MethodBody,
        refs::{FieldRef, MethodRef, TypeRef, TypeRefRc},
        resolver::ReferenceTable,
        token::Token,
    },
    Result,
};

pub const EXCEPTION: Token = Token(0x0100_0001);
pub const POINT: Token = Token(0x0200_0001);
pub const POINT_X: Token = Token(0x0400_0001);
/// `Point::Touch()`, instance, no result
pub const TOUCH: Token = Token(0x0A00_0001);
/// `static void Use(int)`
pub const USE: Token = Token(0x0A00_0002);

pub fn references() -> ReferenceTable {
    let mut table = ReferenceTable::new();
    table.add_type(TypeRef::new(EXCEPTION, "System.Exception"));
    table.add_type(TypeRef::value_type(POINT, "Point"));
    table.add_field(FieldRef::new(POINT_X, "X"));
    table.add_method(MethodRef::new(TOUCH, "Touch", 0, true, false));
    table.add_method(MethodRef::new(USE, "Use", 1, false, false));
    table
}

pub fn exception_type() -> TypeRefRc {
    Arc::new(TypeRef::new(EXCEPTION, "System.Exception"))
}

/// Assembles, normalizes and solves `body`, then drops unreachable code.
pub fn solved(asm: InstructionAssembler, body: MethodBody) -> Result<(MethodBody, MethodCode)> {
    let mut body = body;
    body.instructions = asm.finish()?.instructions;
    let mut code = MethodCode::new(&body, normalize(&body, &references())?)?;
    solve(&mut code, body.locals.len())?;
    code.prune();
    Ok((body, code))
}
