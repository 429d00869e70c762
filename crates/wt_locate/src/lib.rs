pub mod finder;
pub mod hit_test;
pub mod matcher;

pub use finder::{DeepestMatch, find_deepest_matching, find_main_window};
pub use hit_test::HitTester;
pub use matcher::{ClassMatcher, WindowInfo, WindowMatcher};
