//! Page templates for the query form.
//!
//! A template is plain HTML with three kinds of tags:
//! - `<?= path ?>` prints an HTML-escaped value looked up in the render context
//! - `<? if path { ?> ... <? } else { ?> ... <? } ?>` renders a branch by truthiness
//! - `<? for item in path { ?> ... <? } ?>` repeats its body for each array element

mod parser;
mod template;

pub use parser::{Block, BlockContent, ParseResults, Parser};
pub use template::{ParseError, Position, RenderError, Template};
