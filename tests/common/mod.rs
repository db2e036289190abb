//! Shared fixtures for the integration tests.
//!
//! The traces mimic the tool's output: every line carries the `==pid==`
//! prefix, allocation records list their call stack followed by a separator
//! and an `Address ..., size: ...` summary, and memory operations are grouped
//! under `function:` header lines.

#![allow(dead_code)]

use std::io::Write;
use tempfile::NamedTempFile;

/// One 16-byte allocation at 0x2000 written once by `write_buf`.
pub const SINGLE_STORE: &str = "\
==100== Memtrace, a memory tracing tool
==100== Command: ./victim
==100==
==100== Detected allocation of 16 bytes
==100==    at 0x4C2DB8F: malloc (vg_replace_malloc.c:299)
==100==    by 0x400566: make_buf (victim.c:10)
==100==    by 0x4005A0: main (victim.c:22)
==100==
==100== Address 0x2000, size: 16
==100== write_buf:
==100== Store 4 0x2004 into buf offset 0x4
";

/// Three adjacent heap objects and a copy loop that runs past the first one.
pub const HEAP_OVERFLOW: &str = "\
==200== Detected allocation of 80 bytes
==200==    at 0x4C2DB8F: malloc (vg_replace_malloc.c:299)
==200==    by 0x400610: read_packet (net.c:41)
==200==    by 0x400700: main (main.c:12)
==200==
==200== Address 0x1000, size: 80
==200== Detected allocation of 32 bytes
==200==    at 0x4C2DB8F: malloc (vg_replace_malloc.c:299)
==200==    by 0x400800: new_session (session.c:8)
==200==    by 0x400700: main (main.c:13)
==200==
==200== Address 0x1060, size: 32
==200== Detected allocation of 64 bytes
==200==    at 0x4C2DB8F: malloc (vg_replace_malloc.c:299)
==200==    by 0x400900: vprintf (in /lib/libc.so)
==200==    by 0x400910: printf (in /lib/libc.so)
==200==    by 0x400700: main (main.c:14)
==200==
==200== Address 0x1100, size: 64
==200== Detected allocation of 16 bytes
==200==    at 0x4C2DB8F: malloc (vg_replace_malloc.c:299)
==200==    by 0x400A00: new_timer (timer.c:3)
==200==    by 0x400700: main (main.c:15)
==200==
==200== Address 0x1080, size: 16
==200== new_session:
==200== Store 8 0x1060 into session offset 0x0
==200== Store 8 0x1068 into session offset 0x8
==200== copy_payload:
==200== Store 8 0x1040 into packet offset 0x40
==200== Store 8 0x1048 into packet offset 0x48
==200== Store 8 0x1050 into packet offset 0x50
==200== Store 8 0x1058 into packet offset 0x58
==200== Store 8 0x1060 into packet offset 0x60
==200== Store 8 0x1068 into packet offset 0x68
==200== memset:
==200== Store 8 0x1070 into session offset 0x10
==200== session_touch:
==200== Load 8 0x1068 from session offset 0x8
==200== Load 8 0x1080 from timer offset 0x0
";

/// Write `content` to a temporary trace file.
pub fn trace_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// Write a whitespace-delimited name list to a temporary file.
pub fn list_file(names: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", names.join(" ")).unwrap();
    file.flush().unwrap();
    file
}
