pub mod engine;
pub mod node;
pub mod walk;

pub use engine::{ChildIter, ExpansionReport, TreeEngine};
pub use node::{ChildList, TreeNode};
pub use walk::{children_count, enumerate_children, enumerate_to_root, enumerate_values_to_root};
