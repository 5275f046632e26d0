mod digest;
mod extensions;
mod identity;
mod profile;

pub use digest::*;
pub use extensions::*;
pub use identity::*;
pub use profile::*;
