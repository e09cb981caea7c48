pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod excel;
pub mod inspect;
pub mod pplx;
pub mod processor;
pub mod scanner;
