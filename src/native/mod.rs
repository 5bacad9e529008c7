/// Native module contains the implementation of the executor trait that
/// talks to the local toolchain directly: interpreters and the C++
/// compiler are spawned as ordinary child processes, with no container or
/// sandbox layer in between.
pub mod executor;
