pub mod config;
pub mod consts;
pub mod error;
pub mod filters;
pub mod flow;
pub mod frame;
pub mod io;
pub mod refine;
