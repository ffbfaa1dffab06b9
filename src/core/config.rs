mod parsing;
mod settings;
mod types;

pub(crate) use types::{Settings, StorageSettings};

#[cfg(test)]
use types::{ConfigError, Environment};

#[cfg(test)]
mod tests;
