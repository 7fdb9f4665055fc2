//! Library half of the `rvsim-cli` package: the GDB stub wiring and the connection/target types
//! `main.rs` drives. Split out from the binary so integration tests can exercise a full GDB
//! session in-process, the same way the binary does, without spawning a subprocess.

pub mod gdb;
pub mod target;
pub mod tcp;
