//! C ABI types shared by the VM and its embedders
//!
//! The layout follows `squirrel.h`: raw type bits (`RT_*`) are combined with
//! capability flags into the object types (`OT_*`) reported by `sq_gettype`,
//! and `HSQOBJECT` is a tagged handle whose payload is interpreted according
//! to its type.

#![allow(non_camel_case_types, non_snake_case, non_upper_case_globals)]

use crate::object::Object;
use crate::vm::SQVM;
use std::os::raw::c_void;

/// Opaque VM handle passed to every API function
pub type HSQUIRRELVM = *mut SQVM;

pub type SQInteger = i64;
pub type SQUnsignedInteger = u64;
pub type SQFloat = f64;
pub type SQBool = SQUnsignedInteger;
pub type SQRESULT = SQInteger;
pub type SQChar = std::os::raw::c_char;
pub type SQUserPointer = *mut c_void;

pub const SQTrue: SQBool = 1;
pub const SQFalse: SQBool = 0;

pub const SQ_OK: SQRESULT = 0;
pub const SQ_ERROR: SQRESULT = -1;

#[inline]
pub fn SQ_SUCCEEDED(res: SQRESULT) -> bool {
    res >= 0
}

#[inline]
pub fn SQ_FAILED(res: SQRESULT) -> bool {
    res < 0
}

/// Native function signature
///
/// Receives the VM whose stack holds `this`, the call arguments and any free
/// variables bound by `sq_newclosure`. Returns 1 when a result has been pushed,
/// 0 for no result, or a negative value (usually via `sq_throwerror`) on error.
pub type SQFUNCTION = unsafe extern "C" fn(HSQUIRRELVM) -> SQInteger;

pub const SQOBJECT_REF_COUNTED: u32 = 0x0800_0000;
pub const SQOBJECT_NUMERIC: u32 = 0x0400_0000;
pub const SQOBJECT_DELEGABLE: u32 = 0x0200_0000;
pub const SQOBJECT_CANBEFALSE: u32 = 0x0100_0000;

pub const RT_NULL: u32 = 0x0000_0001;
pub const RT_INTEGER: u32 = 0x0000_0002;
pub const RT_FLOAT: u32 = 0x0000_0004;
pub const RT_BOOL: u32 = 0x0000_0008;
pub const RT_STRING: u32 = 0x0000_0010;
pub const RT_TABLE: u32 = 0x0000_0020;
pub const RT_ARRAY: u32 = 0x0000_0040;
pub const RT_CLOSURE: u32 = 0x0000_0100;
pub const RT_NATIVECLOSURE: u32 = 0x0000_0200;
pub const RT_USERPOINTER: u32 = 0x0000_0800;

/// Object type tag as reported by `sq_gettype`
pub type SQObjectType = u32;

pub const OT_NULL: SQObjectType = RT_NULL | SQOBJECT_CANBEFALSE;
pub const OT_INTEGER: SQObjectType = RT_INTEGER | SQOBJECT_NUMERIC | SQOBJECT_CANBEFALSE;
pub const OT_FLOAT: SQObjectType = RT_FLOAT | SQOBJECT_NUMERIC | SQOBJECT_CANBEFALSE;
pub const OT_BOOL: SQObjectType = RT_BOOL | SQOBJECT_CANBEFALSE;
pub const OT_STRING: SQObjectType = RT_STRING | SQOBJECT_REF_COUNTED;
pub const OT_TABLE: SQObjectType = RT_TABLE | SQOBJECT_REF_COUNTED | SQOBJECT_DELEGABLE;
pub const OT_ARRAY: SQObjectType = RT_ARRAY | SQOBJECT_REF_COUNTED;
pub const OT_CLOSURE: SQObjectType = RT_CLOSURE | SQOBJECT_REF_COUNTED;
pub const OT_NATIVECLOSURE: SQObjectType = RT_NATIVECLOSURE | SQOBJECT_REF_COUNTED;
pub const OT_USERPOINTER: SQObjectType = RT_USERPOINTER;

/// Returns true if the type tag denotes a reference-counted object
#[inline]
pub fn is_ref_counted(t: SQObjectType) -> bool {
    t & SQOBJECT_REF_COUNTED != 0
}

/// Payload of an `HSQOBJECT`, interpreted according to its type tag
#[repr(C)]
#[derive(Clone, Copy)]
pub union SQObjectValue {
    pub n_integer: SQInteger,
    pub f_float: SQFloat,
    pub b_bool: SQBool,
    pub p_user_pointer: SQUserPointer,
    /// Set for every `SQOBJECT_REF_COUNTED` type
    pub p_ref_counted: *const Object,
}

/// Handle to any VM value, usable outside the stack
///
/// A handle filled by `sq_getstackobj` does not own a reference. Call
/// `sq_addref` to keep the object alive and `sq_release` to give it back.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct HSQOBJECT {
    pub _type: SQObjectType,
    pub _unVal: SQObjectValue,
}

impl Default for HSQOBJECT {
    fn default() -> Self {
        HSQOBJECT {
            _type: OT_NULL,
            _unVal: SQObjectValue { n_integer: 0 },
        }
    }
}

impl std::fmt::Debug for HSQOBJECT {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Safety: every payload variant is plain data of the same width
        let bits = unsafe { self._unVal.n_integer };
        f.debug_struct("HSQOBJECT")
            .field("_type", &format_args!("{:#010x}", self._type))
            .field("_unVal", &format_args!("{:#x}", bits))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_type_flags() {
        assert!(is_ref_counted(OT_TABLE));
        assert!(is_ref_counted(OT_STRING));
        assert!(!is_ref_counted(OT_INTEGER));
        assert!(OT_INTEGER & SQOBJECT_NUMERIC != 0);
        assert!(OT_FLOAT & SQOBJECT_NUMERIC != 0);
        assert_ne!(OT_CLOSURE, OT_NATIVECLOSURE);
    }

    #[test]
    fn test_result_helpers() {
        assert!(SQ_SUCCEEDED(SQ_OK));
        assert!(SQ_FAILED(SQ_ERROR));
        assert!(SQ_SUCCEEDED(1));
    }

    #[test]
    fn test_default_handle_is_null() {
        let h = HSQOBJECT::default();
        assert_eq!(h._type, OT_NULL);
    }
}
