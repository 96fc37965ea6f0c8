//! Terminal chat front-end

pub mod app;
pub mod conversation;
pub mod markup;

pub use app::run;
