use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read stage script: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse stage script: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("bpm must be positive, got {0}")]
    NonPositiveBpm(f32),
    #[error("measures per phrase must be at least 1, got {0}")]
    NoMeasures(i32),
    #[error("song length must be at least 1 beat, got {0}")]
    NoLength(i32),
    #[error("rule {index}: beat range [{start}, {end}) is empty")]
    EmptyRange { index: usize, start: i32, end: i32 },
    #[error("rule {index}: stride must be at least 1, got {stride}")]
    BadStride { index: usize, stride: i32 },
    #[error("rule {index}: pattern needs a positive count")]
    ZeroCount { index: usize },
}

/// A spawn pattern the director knows how to realize. Serialized with a
/// `kind` tag so stage scripts stay readable by hand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pattern {
    /// One random circle plus 2-of-8 slots per side, sampled without
    /// replacement, each side independently.
    SideSquares { shoot: bool },
    /// Every slot of one side at once, all shooting.
    SlotSweep { left: bool },
    /// One circle at a uniform random interior position.
    RandomCircle,
    /// `count` distinct grid cells, uniform over the whole grid.
    GridSquares { count: u32 },
    /// A burst of gravity drops with jittered spacing.
    Rain,
    /// A serpentine trail hazard climbing from the bottom edge.
    Serpent,
    /// Evenly spaced full-height beam columns.
    VerticalBeams { count: u32 },
    /// One screen-wide beam at a random height.
    HorizontalBeam { from_right: bool },
    /// A fan of thin beams from a top corner toward the field center.
    CornerCone { top_right: bool },
    /// Five bullets per top corner, aimed at the target's position at
    /// dispatch time.
    AimedVolley,
}

const fn default_stride() -> i32 {
    1
}

/// One row of the choreography table. Fires on `beat` when
/// `start_beat <= beat < end_beat` and the stride divides the offset from
/// the range start. An exact-beat action is a `[b, b+1)` range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChoreographyRule {
    pub start_beat: i32,
    pub end_beat: i32,
    #[serde(default = "default_stride")]
    pub stride: i32,
    pub pattern: Pattern,
}

impl ChoreographyRule {
    pub fn at(beat: i32, pattern: Pattern) -> Self {
        Self { start_beat: beat, end_beat: beat + 1, stride: 1, pattern }
    }

    pub fn every(start_beat: i32, end_beat: i32, stride: i32, pattern: Pattern) -> Self {
        Self { start_beat, end_beat, stride, pattern }
    }

    #[inline(always)]
    pub fn matches(&self, beat: i32) -> bool {
        beat >= self.start_beat
            && beat < self.end_beat
            && (beat - self.start_beat) % self.stride == 0
    }
}

/// A complete stage: song metadata plus the ordered choreography table.
/// Immutable for a run once validated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageScript {
    pub title: String,
    pub artist: String,
    pub bpm: f32,
    pub measures_per_phrase: i32,
    /// The director stops receiving beats past this point; the stage winds
    /// down once the last hazard resolves.
    pub song_length_beats: i32,
    pub rules: Vec<ChoreographyRule>,
}

impl StageScript {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScriptError> {
        let content = std::fs::read_to_string(path)?;
        let script: Self = serde_json::from_str(&content)?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<(), ScriptError> {
        if !(self.bpm.is_finite() && self.bpm > 0.0) {
            return Err(ScriptError::NonPositiveBpm(self.bpm));
        }
        if self.measures_per_phrase < 1 {
            return Err(ScriptError::NoMeasures(self.measures_per_phrase));
        }
        if self.song_length_beats < 1 {
            return Err(ScriptError::NoLength(self.song_length_beats));
        }
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.end_beat <= rule.start_beat {
                return Err(ScriptError::EmptyRange {
                    index,
                    start: rule.start_beat,
                    end: rule.end_beat,
                });
            }
            if rule.stride < 1 {
                return Err(ScriptError::BadStride { index, stride: rule.stride });
            }
            match rule.pattern {
                Pattern::GridSquares { count } | Pattern::VerticalBeams { count } if count == 0 => {
                    return Err(ScriptError::ZeroCount { index });
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// All patterns scheduled for `beat`, in table order.
    pub fn matching(&self, beat: i32) -> impl Iterator<Item = &ChoreographyRule> {
        self.rules.iter().filter(move |r| r.matches(beat))
    }
}

/// The built-in stage. 155 bpm, 288 beats, and the full hazard progression:
/// side squares, rain, slot sweeps, grid bursts, then the serpent phase with
/// beams, corner cones and aimed volleys layered in.
pub fn vapor() -> StageScript {
    use Pattern::*;
    StageScript {
        title: "Vapor".to_string(),
        artist: "unknown".to_string(),
        bpm: 155.0,
        measures_per_phrase: 4,
        song_length_beats: 288,
        rules: vec![
            // Opening: passive squares every 8 beats, then they start shooting.
            ChoreographyRule::every(6, 24, 8, SideSquares { shoot: false }),
            ChoreographyRule::every(30, 64, 8, SideSquares { shoot: true }),
            // Rain section, squares layered over its back half.
            ChoreographyRule::every(64, 124, 1, Rain),
            ChoreographyRule::every(94, 124, 4, SideSquares { shoot: false }),
            // Sweeps with circles on the even beats between them. The circle
            // range splits around beat 134 so the sweep fires alone there.
            ChoreographyRule::at(126, SlotSweep { left: true }),
            ChoreographyRule::every(128, 134, 2, RandomCircle),
            ChoreographyRule::at(134, SlotSweep { left: false }),
            ChoreographyRule::every(136, 142, 2, RandomCircle),
            // Grid bursts every beat.
            ChoreographyRule::every(142, 156, 1, GridSquares { count: 4 }),
            // Serpent phase: a serpent every other beat for the rest of the
            // song, with a rotating cast of beams above it.
            ChoreographyRule::every(158, 288, 2, Serpent),
            ChoreographyRule::at(158, VerticalBeams { count: 4 }),
            ChoreographyRule::every(160, 192, 4, HorizontalBeam { from_right: false }),
            ChoreographyRule::every(192, 224, 4, HorizontalBeam { from_right: true }),
            // Cones alternate corners on the 4s: phrase-start beats fan from
            // the top-left, off-phrase beats from the top-right.
            ChoreographyRule::every(224, 288, 8, CornerCone { top_right: false }),
            ChoreographyRule::every(228, 288, 8, CornerCone { top_right: true }),
            ChoreographyRule::every(256, 288, 4, AimedVolley),
        ],
    }
}
