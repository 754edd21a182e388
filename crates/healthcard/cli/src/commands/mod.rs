// Command handlers
mod card_operations;
mod credentials;

pub(crate) use card_operations::*;
pub(crate) use credentials::*;
