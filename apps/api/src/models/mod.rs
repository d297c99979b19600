pub mod es;
pub mod interview;
pub mod user;
