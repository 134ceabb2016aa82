#![allow(dead_code)]

pub mod harness;
pub mod mock_subworkflows;
pub mod stub_collaborators;

pub use harness::*;
pub use mock_subworkflows::*;
pub use stub_collaborators::*;
