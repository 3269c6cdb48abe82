use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// One control cycle of external telemetry.
///
/// Values are sanitized on the way into the [`TickRing`](crate::ring::TickRing),
/// so anything stored downstream is finite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TickSnapshot {
    pub amp: f32,
    pub tempo: f32,
    pub consent: f32,
    pub influence: f32,
    pub harmony: f32,
    pub dream: f32,
    pub filter_delta: f32,
    pub filter_alpha: f32,
}

impl TickSnapshot {
    pub const FIELD_COUNT: usize = 8;

    pub fn from_array(v: [f32; Self::FIELD_COUNT]) -> Self {
        Self {
            amp: v[0],
            tempo: v[1],
            consent: v[2],
            influence: v[3],
            harmony: v[4],
            dream: v[5],
            filter_delta: v[6],
            filter_alpha: v[7],
        }
    }

    pub fn to_array(&self) -> [f32; Self::FIELD_COUNT] {
        [
            self.amp,
            self.tempo,
            self.consent,
            self.influence,
            self.harmony,
            self.dream,
            self.filter_delta,
            self.filter_alpha,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// Replace non-finite fields with the matching field of `last_valid`,
    /// or zero when there is no previous sample.
    pub fn sanitized(self, last_valid: Option<&TickSnapshot>) -> Self {
        if self.is_finite() {
            return self;
        }
        let fallback = last_valid.map(|s| s.to_array()).unwrap_or_default();
        let mut v = self.to_array();
        for (x, fb) in v.iter_mut().zip(fallback) {
            if !x.is_finite() {
                *x = if fb.is_finite() { fb } else { 0.0 };
            }
        }
        Self::from_array(v)
    }
}

/// Why an episode was captured. Bits combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagMask(u32);

impl TagMask {
    pub const NONE: TagMask = TagMask(0);
    pub const SPIKE: TagMask = TagMask(0x1);
    pub const ALIGN: TagMask = TagMask(0x2);
    pub const LOW_HARM: TagMask = TagMask(0x4);
    pub const ALL: TagMask = TagMask(0x1 | 0x2 | 0x4);

    const NAMED: [(TagMask, &'static str); 3] = [
        (TagMask::SPIKE, "SPIKE"),
        (TagMask::ALIGN, "ALIGN"),
        (TagMask::LOW_HARM, "LOW_HARM"),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        TagMask(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn intersects(self, other: TagMask) -> bool {
        self.0 & other.0 != 0
    }

    /// `NONE`, or the set tag names joined by `|` (e.g. `SPIKE|LOW_HARM`).
    ///
    /// Bits without a name are not rendered.
    pub fn label(self) -> String {
        if self.is_empty() {
            return "NONE".to_string();
        }
        Self::NAMED
            .iter()
            .filter(|(tag, _)| self.intersects(*tag))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Parse a tag list such as `"spike|align"` or `"LOW_HARM, SPIKE"`.
    ///
    /// Separators are space, `|`, `,` and `;`. Matching is case-insensitive.
    /// Unknown tokens contribute no bits.
    pub fn parse(spec: &str) -> Self {
        spec.split(|c: char| c == '|' || c == ',' || c == ';' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .map(|t| Self::from_token(&t.to_ascii_uppercase()))
            .fold(TagMask::NONE, |acc, t| acc | t)
    }

    fn from_token(token: &str) -> Self {
        match token {
            "SPIKE" => TagMask::SPIKE,
            "ALIGN" => TagMask::ALIGN,
            "LOW_HARM" | "LOWHARM" => TagMask::LOW_HARM,
            "ALL" => TagMask::ALL,
            _ => TagMask::NONE,
        }
    }
}

impl BitOr for TagMask {
    type Output = TagMask;

    fn bitor(self, rhs: TagMask) -> TagMask {
        TagMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for TagMask {
    fn bitor_assign(&mut self, rhs: TagMask) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for TagMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
