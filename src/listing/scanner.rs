//! A scanner for fields delimited by one or more space characters.

pub(crate) struct Scanner<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(s: &'a str) -> Self {
        Scanner {
            bytes: s.as_bytes(),
            position: 0,
        }
    }

    /// Returns up to `count` further fields. Stops early at end of input.
    pub(crate) fn next_fields(&mut self, count: usize) -> Vec<&'a str> {
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            let field = self.next();
            if field.is_empty() {
                break;
            }
            fields.push(field);
        }
        fields
    }

    /// Returns the next field, or the empty string at end of input.
    pub(crate) fn next(&mut self) -> &'a str {
        let len = self.bytes.len();

        while self.position < len && self.bytes[self.position] == b' ' {
            self.position += 1;
        }

        let start = self.position;

        while self.position < len {
            if self.bytes[self.position] == b' ' {
                self.position += 1;
                return field_str(&self.bytes[start..self.position - 1]);
            }
            self.position += 1;
        }

        field_str(&self.bytes[start..self.position])
    }

    /// Returns everything after the last consumed field, verbatim.
    pub(crate) fn remaining(&self) -> &'a str {
        field_str(&self.bytes[self.position..])
    }
}

// The scanner only ever splits on single-byte spaces, so slices stay on
// UTF-8 boundaries of the original &str.
fn field_str(bytes: &[u8]) -> &str {
    std::str::from_utf8(bytes).expect("split on ASCII space cannot break UTF-8")
}
