//! bytepatch data model — keys, trees and format versions.

pub mod keys;
pub mod tree;
pub mod version;
