//! Operand tags embedded in instruction encodings.
//!
//! Each tag is a single byte. Conversion from an unrecognised byte returns
//! that byte as the error so the engine can report it with the failing
//! instruction position.

macro_rules! byte_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $value, )+
        }

        impl TryFrom<u8> for $name {
            type Error = u8;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $value => Ok($name::$variant), )+
                    other => Err(other),
                }
            }
        }
    };
}

byte_enum! {
    /// Operand width of integer instructions, in bytes.
    pub enum Width {
        Byte = 1,
        Short = 2,
        Int = 4,
        Long = 8,
    }
}

impl Width {
    /// Width in bytes.
    pub fn bytes(self) -> usize {
        self as usize
    }
}

byte_enum! {
    /// `Allocate_Stack` modes.
    pub enum StackAllocMode {
        /// Default value follows inline in the instruction stream.
        WithDefaultValue = 0,
        /// Push a copy of an already allocated variable.
        PushVariable = 1,
    }
}

byte_enum! {
    /// `Allocate_Heap` modes.
    pub enum HeapAllocMode {
        /// Byte count is an inline literal.
        Fixed = 0,
        /// Byte count is read from a frame variable.
        FromVariable = 1,
    }
}

byte_enum! {
    /// `Mov` destination modes.
    pub enum DestMode {
        /// Write at the frame slot itself.
        Direct = 1,
        /// Write at the address held by the frame slot.
        Indirect = 2,
    }
}

byte_enum! {
    /// `Mov` source modes.
    pub enum SourceMode {
        /// Read from a frame slot.
        Frame = 1,
        /// Literal bytes embedded in the instruction.
        Immediate = 2,
        /// Read from the address held by a frame slot.
        Deref = 3,
        /// Read from an absolute address.
        Absolute = 4,
    }
}

byte_enum! {
    /// `PtrShift` modes.
    pub enum ShiftMode {
        /// Shift is an inline literal.
        Immediate = 0,
        /// Shift is a frame variable plus an inline constant.
        FromVariable = 1,
    }
}

byte_enum! {
    /// `Section` kinds.
    pub enum SectionKind {
        Data = 0,
        Code = 1,
    }
}

byte_enum! {
    /// `Compare` relational operators.
    pub enum CompareOp {
        Eq = 0,
        Neq = 1,
        Gt = 2,
        Ge = 3,
        Lt = 4,
        Le = 5,
    }
}

byte_enum! {
    /// `VMCommand` sub-commands.
    pub enum Command {
        Print = 0,
        Sleep = 2,
        Invoke = 3,
    }
}

byte_enum! {
    /// Value kinds understood by `Print` and `Sleep` arguments.
    pub enum ValueKind {
        Bool = 0,
        Byte = 1,
        Short = 2,
        Int = 3,
        Long = 4,
        Pointer = 5,
        Str = 6,
    }
}
