//! Shared fixtures for unit tests
//!
//! Plugin modules are hand-assembled WASM binaries so tests need no
//! wat compiler at build time.

/// Equivalent to:
///   (module (func (export "activate")) (func (export "mount")))
pub fn module_bytes() -> Vec<u8> {
    vec![
        0x00, 0x61, 0x73, 0x6d, // \0asm
        0x01, 0x00, 0x00, 0x00, // version 1
        // type section: one type, () -> ()
        0x01, 0x04, 0x01, 0x60, 0x00, 0x00,
        // function section: two funcs of type 0
        0x03, 0x03, 0x02, 0x00, 0x00,
        // export section: "activate" -> func 0, "mount" -> func 1
        0x07, 0x14, 0x02, //
        0x08, b'a', b'c', b't', b'i', b'v', b'a', b't', b'e', 0x00, 0x00, //
        0x05, b'm', b'o', b'u', b'n', b't', 0x00, 0x01,
        // code section: two empty bodies
        0x0a, 0x07, 0x02, 0x02, 0x00, 0x0b, 0x02, 0x00, 0x0b,
    ]
}

/// Equivalent to:
///   (module (func (export "mount")))
pub fn module_without_activate() -> Vec<u8> {
    vec![
        0x00, 0x61, 0x73, 0x6d, // \0asm
        0x01, 0x00, 0x00, 0x00, // version 1
        // type section: one type, () -> ()
        0x01, 0x04, 0x01, 0x60, 0x00, 0x00,
        // function section: one func of type 0
        0x03, 0x02, 0x01, 0x00,
        // export section: "mount" -> func 0
        0x07, 0x09, 0x01, 0x05, b'm', b'o', b'u', b'n', b't', 0x00, 0x00,
        // code section: one empty body
        0x0a, 0x04, 0x01, 0x02, 0x00, 0x0b,
    ]
}
