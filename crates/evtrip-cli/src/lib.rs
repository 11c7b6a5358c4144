//! EV trip planner CLI library.
//!
//! Output formatting shared by the `evtrip` subcommands.

pub mod output;
