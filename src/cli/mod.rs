pub mod args;

use clap::Parser;

pub use args::{Arguments, Module, Platform, RunBwaArgs, FqstatsArgs};

pub fn parse() -> Arguments {
    Arguments::parse()
}
