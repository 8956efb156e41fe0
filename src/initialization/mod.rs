mod constant;
mod initializer;
mod random;

pub use constant::ZerosInitializer;
pub use initializer::Initializer;
pub use random::NormalInitializer;
