pub mod analyze;
pub mod app;
pub mod commands;
pub mod context;
pub mod detect;
pub mod dismiss;
pub mod dispatch;
pub mod env;
pub mod knowledge;
pub mod output;
pub mod recover;
pub mod runtime;
