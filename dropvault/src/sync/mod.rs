pub mod engine;
pub mod index;
pub mod paths;
pub mod remote;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;
