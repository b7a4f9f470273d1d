//! Method bodies as handed to the reconstruction engine.
//!
//! A [`MethodBody`] bundles everything the method body provider yields for one method:
//! the ordered instruction stream, declared locals (with pinned/name metadata), declared
//! parameters, whether there is an implicit `this`, and the exception region table.

use bitflags::bitflags;

use crate::{
    assembly::Instruction,
    metadata::{method::ExceptionHandler, refs::TypeRefRc},
};

bitflags! {
    /// Properties of the method that influence how its body is reconstructed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MethodFlags: u8 {
        /// Instance method; argument 0 is `this`.
        const HAS_THIS = 0x01;
        /// The method returns a value, so `ret` pops one item.
        const RETURNS_VALUE = 0x02;
        /// Property setter; the last parameter is renamed `value`.
        const SETTER = 0x04;
        /// Event `add`/`remove` accessor; the last parameter is renamed `value`.
        const EVENT_ACCESSOR = 0x08;
    }
}

/// A declared local variable slot.
#[derive(Debug, Clone, Default)]
pub struct LocalDef {
    /// Debug name, if the provider has one
    pub name: Option<String>,
    /// Declared type
    pub ty: Option<TypeRefRc>,
    /// Whether the slot is pinned (never split)
    pub pinned: bool,
}

impl LocalDef {
    /// An unnamed, untyped local.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A named local.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        LocalDef {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// A pinned local.
    #[must_use]
    pub fn pinned() -> Self {
        LocalDef {
            pinned: true,
            ..Self::default()
        }
    }

    /// Sets the declared type.
    #[must_use]
    pub fn with_type(mut self, ty: TypeRefRc) -> Self {
        self.ty = Some(ty);
        self
    }
}

/// A declared parameter, not counting `this`.
#[derive(Debug, Clone)]
pub struct ParameterDef {
    /// Parameter name
    pub name: String,
    /// Declared type
    pub ty: Option<TypeRefRc>,
}

impl ParameterDef {
    /// Creates an untyped parameter.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        ParameterDef {
            name: name.into(),
            ty: None,
        }
    }
}

/// One method body: the unit of work of the reconstruction engine.
///
/// # Examples
///
/// ```rust
/// use cilast::{
///     assembly::InstructionAssembler,
///     metadata::method::{LocalDef, MethodBody, MethodFlags, ParameterDef},
/// };
///
/// let mut asm = InstructionAssembler::new();
/// asm.ldarg_1()?.stloc_0()?.ret()?;
/// let code = asm.finish()?;
///
/// let body = MethodBody::new("Sample::Store", code.instructions)
///     .with_flags(MethodFlags::HAS_THIS)
///     .with_parameters(vec![ParameterDef::new("x")])
///     .with_locals(vec![LocalDef::named("copy")]);
///
/// assert_eq!(body.argument_count(), 2);
/// assert_eq!(body.code_size, 3);
/// # Ok::<(), cilast::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct MethodBody {
    /// Method identity used in diagnostics
    pub name: String,
    /// Method properties
    pub flags: MethodFlags,
    /// Declaring type, used as the type of `this`
    pub declaring_type: Option<TypeRefRc>,
    /// Declared parameters, excluding `this`
    pub parameters: Vec<ParameterDef>,
    /// Declared local variable slots
    pub locals: Vec<LocalDef>,
    /// The raw instruction stream, ordered by offset
    pub instructions: Vec<Instruction>,
    /// The exception region table
    pub exception_handlers: Vec<ExceptionHandler>,
    /// Size of the IL code in bytes
    pub code_size: u32,
}

impl MethodBody {
    /// Creates a static, void method body from an instruction stream.
    ///
    /// The code size is derived from the last instruction.
    #[must_use]
    pub fn new(name: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        let code_size = instructions.last().map_or(0, |i| i.offset + i.size);
        MethodBody {
            name: name.into(),
            flags: MethodFlags::empty(),
            declaring_type: None,
            parameters: Vec::new(),
            locals: Vec::new(),
            instructions,
            exception_handlers: Vec::new(),
            code_size,
        }
    }

    /// Sets the method flags.
    #[must_use]
    pub fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the declaring type.
    #[must_use]
    pub fn with_declaring_type(mut self, ty: TypeRefRc) -> Self {
        self.declaring_type = Some(ty);
        self
    }

    /// Sets the declared parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Vec<ParameterDef>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the declared locals.
    #[must_use]
    pub fn with_locals(mut self, locals: Vec<LocalDef>) -> Self {
        self.locals = locals;
        self
    }

    /// Sets the exception region table.
    #[must_use]
    pub fn with_handlers(mut self, handlers: Vec<ExceptionHandler>) -> Self {
        self.exception_handlers = handlers;
        self
    }

    /// Returns `true` for instance methods.
    #[must_use]
    pub fn has_this(&self) -> bool {
        self.flags.contains(MethodFlags::HAS_THIS)
    }

    /// Returns `true` if `ret` pops a value.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        self.flags.contains(MethodFlags::RETURNS_VALUE)
    }

    /// Number of argument slots addressable by `ldarg`, including `this`.
    #[must_use]
    pub fn argument_count(&self) -> usize {
        self.parameters.len() + usize::from(self.has_this())
    }
}
