//! Compact encoding of increasing number sets as `base:count:stride` spans.
//!
//! Textual form is `[b, b:c, b:c:s, ...]`. A bare `b` is one value, `b:c` is
//! `c` consecutive values starting at `b`, and `b:c:s` is `c` values starting
//! at `b` spaced `s` apart. Commas between spans are optional and numbers may
//! carry a leading `#`.

use std::fmt;
use std::str::FromStr;

use strata_error::{DbError, Result};

/// A run of `count` values starting at `base`, `stride` apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub base: f64,
    pub count: u64,
    pub stride: f64,
}

impl Span {
    pub fn single(value: f64) -> Self {
        Span {
            base: value,
            count: 1,
            stride: 1.0,
        }
    }

    /// Last value in the span.
    pub fn last(&self) -> f64 {
        self.base + (self.count - 1) as f64 * self.stride
    }

    pub fn value(&self, idx: u64) -> f64 {
        self.base + idx as f64 * self.stride
    }

    /// Position of `v` within the span, if present.
    fn position(&self, v: f64) -> Option<u64> {
        if v < self.base || v > self.last() {
            return None;
        }
        let steps = (v - self.base) / self.stride;
        if steps.fract() == 0.0 {
            Some(steps as u64)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RangeList {
    spans: Vec<Span>,
    /// Values before each span, for rank queries.
    offsets: Vec<u64>,
}

impl RangeList {
    pub fn try_new(spans: Vec<Span>) -> Result<Self> {
        for (idx, span) in spans.iter().enumerate() {
            if span.count == 0 {
                return Err(DbError::validation("Range count must be at least 1")
                    .with_field("base", span.base));
            }
            if !(span.stride > 0.0) {
                return Err(DbError::validation("Range stride must be positive")
                    .with_field("stride", span.stride));
            }
            if !span.base.is_finite() {
                return Err(DbError::validation("Range base must be finite")
                    .with_field("base", span.base));
            }
            if idx > 0 {
                let prev = &spans[idx - 1];
                if span.base <= prev.last() {
                    return Err(DbError::validation("Range bases must be strictly increasing")
                        .with_field("base", span.base)
                        .with_field("previous_end", prev.last()));
                }
            }
        }

        // The total count must fit so rank arithmetic never overflows.
        let mut offsets = Vec::with_capacity(spans.len());
        let mut total: u64 = 0;
        for span in &spans {
            offsets.push(total);
            total = total.checked_add(span.count).ok_or_else(|| {
                DbError::validation("Range list too large")
                    .with_field("base", span.base)
                    .with_field("count", span.count)
            })?;
        }

        Ok(RangeList { spans, offsets })
    }

    pub fn single(value: f64) -> Self {
        RangeList {
            spans: vec![Span::single(value)],
            offsets: vec![0],
        }
    }

    /// Contiguous values `start..start+count`.
    pub fn contiguous(start: f64, count: u64) -> Self {
        if count == 0 {
            return Self::default();
        }
        RangeList {
            spans: vec![Span {
                base: start,
                count,
                stride: 1.0,
            }],
            offsets: vec![0],
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Parser::new(s).parse()
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Number of values represented.
    pub fn count(&self) -> u64 {
        match (self.spans.last(), self.offsets.last()) {
            (Some(span), Some(offset)) => offset + span.count,
            _ => 0,
        }
    }

    pub fn min(&self) -> Option<f64> {
        self.spans.first().map(|s| s.base)
    }

    /// Largest value, inclusive.
    pub fn max(&self) -> Option<f64> {
        self.spans.last().map(|s| s.last())
    }

    /// If every value is a whole number.
    pub fn is_integral(&self) -> bool {
        self.spans
            .iter()
            .all(|s| s.base.fract() == 0.0 && (s.count == 1 || s.stride.fract() == 0.0))
    }

    /// If the values form one unbroken run of consecutive integers.
    pub fn is_contiguous(&self) -> bool {
        self.is_integral()
            && self.spans.iter().all(|s| s.count == 1 || s.stride == 1.0)
            && self.spans.windows(2).all(|w| w[1].base == w[0].last() + 1.0)
    }

    /// Membership test without expanding the list.
    pub fn has(&self, v: f64) -> bool {
        self.index_of(v).is_some()
    }

    /// Rank of `v` among the represented values.
    pub fn index_of(&self, v: f64) -> Option<u64> {
        let idx = self.spans.partition_point(|s| s.base <= v);
        if idx == 0 {
            return None;
        }
        let pos = self.spans[idx - 1].position(v)?;
        Some(self.offsets[idx - 1] + pos)
    }

    /// Value at rank `idx`.
    pub fn value_at(&self, idx: u64) -> Option<f64> {
        if idx >= self.count() {
            return None;
        }
        let span_idx = self.offsets.partition_point(|&off| off <= idx) - 1;
        Some(self.spans[span_idx].value(idx - self.offsets[span_idx]))
    }

    /// All represented values in ascending order.
    ///
    /// Allocates one entry per value.
    pub fn expand(&self) -> Vec<f64> {
        self.values_in(f64::NEG_INFINITY, f64::INFINITY).collect()
    }

    /// Represented values inside `[start, end)`, ascending.
    pub fn values_in(&self, start: f64, end: f64) -> impl Iterator<Item = f64> + '_ {
        let first = self.spans.partition_point(|s| s.last() < start);
        self.spans[first..]
            .iter()
            .take_while(move |s| s.base < end)
            .flat_map(move |s| {
                let skip = if start > s.base {
                    ((start - s.base) / s.stride).ceil() as u64
                } else {
                    0
                };
                (skip..s.count).map(move |idx| s.value(idx))
            })
            .take_while(move |v| *v < end)
    }
}

impl FromStr for RangeList {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for RangeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, span) in self.spans.iter().enumerate() {
            if idx > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", span.base)?;
            if span.count > 1 || span.stride != 1.0 {
                write!(f, ":{}", span.count)?;
                if span.stride != 1.0 {
                    write!(f, ":{}", span.stride)?;
                }
            }
        }
        write!(f, "]")
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_whitespace();
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(DbError::validation(format!("Expected '{c}' in range list"))
                .with_field("input", self.input)
                .with_field("position", self.pos))
        }
    }

    fn number(&mut self) -> Result<f64> {
        self.skip_whitespace();
        if self.rest().starts_with('#') {
            self.pos += 1;
        }
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
            .unwrap_or(rest.len());
        let text = &rest[..len];
        let value = text.parse::<f64>().map_err(|_| {
            DbError::validation("Invalid number in range list")
                .with_field("value", if text.is_empty() { rest } else { text })
        })?;
        self.pos += len;
        Ok(value)
    }

    fn count(&mut self) -> Result<u64> {
        let count = self.number()?;
        if count.fract() != 0.0 || count < 1.0 {
            return Err(DbError::validation("Range count must be a positive integer")
                .with_field("count", count));
        }
        // `u64::MAX as f64` rounds up to 2^64, which doesn't fit.
        if count >= u64::MAX as f64 {
            return Err(DbError::validation("Range list too large").with_field("count", count));
        }
        Ok(count as u64)
    }

    fn parse(mut self) -> Result<RangeList> {
        self.expect('[')?;

        let mut spans = Vec::new();
        loop {
            if self.eat(']') {
                break;
            }
            if !spans.is_empty() {
                self.eat(',');
            }

            let base = self.number()?;
            let mut span = Span::single(base);
            if self.eat(':') {
                span.count = self.count()?;
                if self.eat(':') {
                    span.stride = self.number()?;
                }
            }
            spans.push(span);
        }

        self.skip_whitespace();
        if !self.rest().is_empty() {
            return Err(DbError::validation("Trailing input after range list")
                .with_field("trailing", self.rest()));
        }

        RangeList::try_new(spans)
    }
}
