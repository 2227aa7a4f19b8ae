#[derive(Debug, Clone, PartialEq)]
pub struct BlockContent {
    pub lineno: usize,
    pub colno: usize,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Html(BlockContent),
    Statement(BlockContent),
    Expression(BlockContent),
}

impl Block {
    pub fn content(&self) -> &BlockContent {
        match self {
            Block::Html(c) | Block::Statement(c) | Block::Expression(c) => c,
        }
    }
}

#[derive(Default, Debug)]
pub struct ParseResults {
    pub blocks: Vec<Block>,
}

impl ParseResults {
    fn add_block(&mut self, block: Block) {
        self.blocks.push(block);
    }
}

/// Splits a page into literal HTML, `<? statement ?>` and `<?= expression ?>` blocks.
pub struct Parser<'a> {
    content: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Parser<'a> {
    pub fn new(content: &'a str) -> Self {
        Self {
            content,
            pos: 0,
            line: 1,
        }
    }

    pub fn parse(&mut self) -> ParseResults {
        self.pos = 0;
        self.line = 1;

        let mut results = ParseResults::default();
        while self.pos < self.content.len() {
            if self.lookahead("<?") {
                results.add_block(self.parse_tag_block());
            } else {
                results.add_block(self.parse_html_block());
            }
        }
        results
    }

    pub fn set_content(&mut self, content: &'a str) {
        self.content = content;
        self.pos = 0;
        self.line = 1;
    }

    fn parse_html_block(&mut self) -> Block {
        let start_line = self.line;
        let start_col = self.column_at(self.pos);
        let start = self.pos;

        while self.pos < self.content.len() && !self.lookahead("<?") {
            if self.consume() == '\n' {
                self.line += 1;
            }
        }

        Block::Html(BlockContent {
            lineno: start_line,
            colno: start_col,
            content: self.content[start..self.pos].to_string(),
        })
    }

    fn parse_tag_block(&mut self) -> Block {
        let start_line = self.line;
        // opening "<?"
        let tag_pos = self.pos;
        let _ = self.consume();
        let _ = self.consume();

        // 1-based column index.
        let mut start_col = self.column_at(tag_pos) + 2;

        let mut buf = String::new();
        while self.pos < self.content.len() && !self.lookahead("?>") {
            let c = self.consume();
            if c == '\n' {
                self.line += 1;
            }
            buf.push(c);
        }

        if self.lookahead("?>") {
            let _ = self.consume();
            let _ = self.consume();
        }

        let trimmed_start = buf.trim_start();
        if trimmed_start.starts_with('=') {
            // column of the first expression char, past '=' and any whitespace after it
            let after_eq = trimmed_start[1..].trim();
            if let Some(eq_idx) = buf.find('=') {
                let chars_to_eq = buf[..eq_idx].chars().count();
                let ws_after_eq = buf[eq_idx + '='.len_utf8()..]
                    .chars()
                    .take_while(|c| c.is_whitespace())
                    .count();
                start_col += chars_to_eq + 1 + ws_after_eq;
            }
            Block::Expression(BlockContent {
                lineno: start_line,
                colno: start_col,
                content: after_eq.to_string(),
            })
        } else {
            Block::Statement(BlockContent {
                lineno: start_line,
                colno: start_col,
                content: buf,
            })
        }
    }

    fn lookahead(&self, pat: &str) -> bool {
        self.content.as_bytes()[self.pos..].starts_with(pat.as_bytes())
    }

    fn consume(&mut self) -> char {
        let ch = self.content[self.pos..].chars().next().unwrap_or('\0');
        self.pos += ch.len_utf8();
        ch
    }
}

impl<'a> Parser<'a> {
    /// Compute the 1-based column number at the given byte position in `self.content`.
    /// Counts Unicode scalar values to avoid byte/char mismatches.
    fn column_at(&self, byte_pos: usize) -> usize {
        let prefix = &self.content[..byte_pos];
        match prefix.rfind('\n') {
            Some(nl_idx) => self.content[nl_idx + 1..byte_pos].chars().count() + 1,
            None => prefix.chars().count() + 1,
        }
    }
}
