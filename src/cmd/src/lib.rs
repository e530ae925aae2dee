mod cmd;
mod controller;

pub use cmd::run;
