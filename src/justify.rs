//! Justification spacing split.
//!
//! Leftover line width is distributed between inter-character spacing and
//! inter-word spacing. Character spacing is spread over the gaps between
//! characters (`n_chars - 1`) and is capped; whatever the cap withholds
//! moves to word spacing, or stays unallocated when there are no spaces.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JustifyParams {
    /// Share of the leftover given to word spacing when spaces exist.
    pub word_ratio: f32,
    /// Upper bound for character spacing in millimetres (0 = no cap).
    pub max_char_spacing: f32,
    /// Scripts that must not be letter-spaced (cursive joining, fixed
    /// pitch) only stretch spaces.
    pub words_only: bool,
}

impl Default for JustifyParams {
    fn default() -> Self {
        Self {
            word_ratio: 0.4,
            max_char_spacing: 2.0,
            words_only: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpacingSplit {
    pub char_spacing: f32,
    pub word_spacing: f32,
}

impl SpacingSplit {
    pub fn negated(self) -> Self {
        Self {
            char_spacing: -self.char_spacing,
            word_spacing: -self.word_spacing,
        }
    }
}

fn cap(value: f32, max: f32) -> f32 {
    if max > 0.0 {
        value.min(max)
    } else {
        value
    }
}

/// Split `leftover` millimetres over a line of `n_chars` characters of which
/// `n_spaces` are spaces. Negative leftovers produce no spacing.
pub fn split(
    n_chars: usize,
    n_spaces: usize,
    leftover: f32,
    params: &JustifyParams,
) -> SpacingSplit {
    let leftover = leftover.max(0.0);
    if n_chars == 0 || leftover == 0.0 {
        return SpacingSplit::default();
    }
    if params.words_only {
        return SpacingSplit {
            char_spacing: 0.0,
            word_spacing: if n_spaces > 0 { leftover / n_spaces as f32 } else { 0.0 },
        };
    }
    if n_chars == 1 {
        return SpacingSplit {
            char_spacing: leftover,
            word_spacing: 0.0,
        };
    }
    let gaps = (n_chars - 1) as f32;
    if n_spaces == 0 {
        return SpacingSplit {
            char_spacing: cap(leftover / gaps, params.max_char_spacing),
            word_spacing: 0.0,
        };
    }

    let ratio = params.word_ratio.clamp(0.0, 1.0);
    let wanted = leftover * (1.0 - ratio) / gaps;
    let char_spacing = cap(wanted, params.max_char_spacing);
    // Renormalise: the part the cap withheld goes to the spaces.
    let word_spacing = (leftover - char_spacing * gaps) / n_spaces as f32;
    SpacingSplit {
        char_spacing,
        word_spacing: word_spacing.max(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const P: JustifyParams = JustifyParams {
        word_ratio: 0.4,
        max_char_spacing: 2.0,
        words_only: false,
    };

    #[test]
    fn empty_line_gets_nothing() {
        assert_eq!(split(0, 0, 10.0, &P), SpacingSplit::default());
    }

    #[test]
    fn single_char_takes_everything() {
        let s = split(1, 0, 3.0, &P);
        assert_eq!(s.char_spacing, 3.0);
        assert_eq!(s.word_spacing, 0.0);
    }

    #[test]
    fn words_only_mode() {
        let p = JustifyParams { words_only: true, ..P };
        assert_eq!(split(10, 4, 8.0, &p).word_spacing, 2.0);
        assert_eq!(split(10, 0, 8.0, &p), SpacingSplit::default());
    }

    #[test]
    fn no_spaces_is_capped_and_excess_dropped() {
        let s = split(3, 0, 10.0, &P);
        assert_eq!(s.char_spacing, 2.0);
        assert_eq!(s.word_spacing, 0.0);
        let s = split(11, 0, 5.0, &P);
        assert!((s.char_spacing - 0.5).abs() < 1e-6);
    }

    #[test]
    fn ratio_split_with_spaces() {
        // 21 chars, 4 spaces, 10 mm: 6 mm over 20 gaps, 4 mm over 4 spaces.
        let s = split(21, 4, 10.0, &P);
        assert!((s.char_spacing - 0.3).abs() < 1e-6);
        assert!((s.word_spacing - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cap_moves_excess_to_words() {
        // 3 chars, 1 space, 20 mm: char share 6 mm/gap capped to 2.
        let s = split(3, 1, 20.0, &P);
        assert_eq!(s.char_spacing, 2.0);
        assert!((s.word_spacing - 16.0).abs() < 1e-5);
    }

    proptest! {
        #[test]
        fn never_negative_and_never_exceeds_leftover(
            n_chars in 0usize..200,
            spaces in 0usize..50,
            leftover in -10.0f32..100.0,
            ratio in 0.0f32..1.0,
            max in 0.0f32..5.0,
        ) {
            let n_spaces = spaces.min(n_chars);
            let params = JustifyParams {
                word_ratio: ratio,
                max_char_spacing: max,
                words_only: false,
            };
            let s = split(n_chars, n_spaces, leftover, &params);
            prop_assert!(s.char_spacing >= 0.0);
            prop_assert!(s.word_spacing >= 0.0);
            let gaps = n_chars.saturating_sub(1).max(usize::from(n_chars == 1)) as f32;
            let used = gaps * s.char_spacing + n_spaces as f32 * s.word_spacing;
            prop_assert!(used <= leftover.max(0.0) + 1e-3);
        }
    }
}
