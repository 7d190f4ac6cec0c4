pub mod auth;
pub mod bootstrap;
pub mod commands;
pub mod config_form;
pub mod history;
pub mod ticker;
pub mod timer;

#[cfg(test)]
pub(crate) mod test_support;
