pub mod style;

pub use style::{ColorTokens, StyleTokens, DEFAULT_COLORS, LAYOUT_TOKENS};
