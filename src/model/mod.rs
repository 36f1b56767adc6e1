mod access;
mod class_file;
mod constant_pool;
mod debug;
pub mod equality;
mod instruction;
pub mod iterate;
pub mod signature;

pub use self::access::AccessFlags;
pub use self::class_file::*;
pub use self::constant_pool::{Constant, ConstantPool, MemberRef, PoolError};
pub use self::debug::DebugIr;
pub use self::instruction::*;
