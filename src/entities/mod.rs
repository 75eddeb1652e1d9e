// Entity Models
//
// Records owned by the registry rather than the fee engine:
// - Students (read by the engine for class + identity)
// - Staff users (checked by the gateway before any ledger write)

pub mod student;
pub mod user;

pub use student::{Student, StudentDirectory, StudentRegistry};
pub use user::{Role, StaffDirectory, StaffRegistry, StaffUser};
