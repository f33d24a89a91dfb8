//! `wanted` episode-selector grammar (spec.md §4.6/§8): comma-separated
//! `SxE` tokens and `SxE-SxE` ranges, e.g. `"1x1-1x3,2x5"`. The spec
//! leaves the grammar beyond single `SxE` points and same-season ranges
//! unspecified (§9 open question); this parser covers exactly those two
//! forms and rejects anything else rather than guessing further syntax.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Episode {
    pub season: u32,
    pub number: u32,
}

impl fmt::Display for Episode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{:02}E{:02}", self.season, self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WantedToken {
    Single(Episode),
    Range { season: u32, start: u32, end: u32 },
}

/// A parsed `wanted` selector, ready to test candidate episodes against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WantedSet {
    tokens: Vec<WantedToken>,
}

impl WantedSet {
    pub fn parse(spec: &str) -> Result<Self, String> {
        let mut tokens = Vec::new();
        for raw in spec.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            tokens.push(parse_token(raw)?);
        }
        Ok(Self { tokens })
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// True if `episode` is selected by any token in this set.
    pub fn matches(&self, episode: Episode) -> bool {
        self.tokens.iter().any(|token| match token {
            WantedToken::Single(e) => *e == episode,
            WantedToken::Range { season, start, end } => {
                episode.season == *season && episode.number >= *start && episode.number <= *end
            }
        })
    }

    /// Every individual episode this set selects, ranges expanded. Used to
    /// diff against what a catalog actually resolved, so episodes that were
    /// asked for but never turned up can be reported rather than silently
    /// dropped.
    pub fn requested_episodes(&self) -> Vec<Episode> {
        let mut episodes = Vec::new();
        for token in &self.tokens {
            match token {
                WantedToken::Single(e) => episodes.push(*e),
                WantedToken::Range { season, start, end } => {
                    episodes.extend((*start..=*end).map(|number| Episode { season: *season, number }));
                }
            }
        }
        episodes
    }
}

fn parse_token(raw: &str) -> Result<WantedToken, String> {
    if let Some((left, right)) = raw.split_once('-') {
        let start = parse_sxe(left.trim())?;
        let end = parse_sxe(right.trim())?;
        if start.season != end.season {
            return Err(format!("wanted range '{raw}' must stay within a single season"));
        }
        if end.number < start.number {
            return Err(format!("wanted range '{raw}' has end before start"));
        }
        Ok(WantedToken::Range { season: start.season, start: start.number, end: end.number })
    } else {
        Ok(WantedToken::Single(parse_sxe(raw)?))
    }
}

fn parse_sxe(raw: &str) -> Result<Episode, String> {
    let (season_str, number_str) =
        raw.split_once(['x', 'X']).ok_or_else(|| format!("'{raw}' is not a valid SxE token"))?;
    let season = season_str.trim().parse::<u32>().map_err(|_| format!("'{raw}' has a non-numeric season"))?;
    let number = number_str.trim().parse::<u32>().map_err(|_| format!("'{raw}' has a non-numeric episode number"))?;
    Ok(Episode { season, number })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_token_matches_only_itself() {
        let set = WantedSet::parse("2x7").unwrap();
        assert!(set.matches(Episode { season: 2, number: 7 }));
        assert!(!set.matches(Episode { season: 2, number: 8 }));
        assert!(!set.matches(Episode { season: 3, number: 7 }));
    }

    #[test]
    fn range_token_matches_inclusive_bounds() {
        let set = WantedSet::parse("1x1-1x3").unwrap();
        assert!(set.matches(Episode { season: 1, number: 1 }));
        assert!(set.matches(Episode { season: 1, number: 2 }));
        assert!(set.matches(Episode { season: 1, number: 3 }));
        assert!(!set.matches(Episode { season: 1, number: 4 }));
    }

    #[test]
    fn comma_separated_tokens_combine() {
        let set = WantedSet::parse("1x1-1x3,2x5").unwrap();
        assert!(set.matches(Episode { season: 1, number: 2 }));
        assert!(set.matches(Episode { season: 2, number: 5 }));
        assert!(!set.matches(Episode { season: 2, number: 6 }));
    }

    #[test]
    fn cross_season_range_rejected() {
        assert!(WantedSet::parse("1x10-2x1").is_err());
    }

    #[test]
    fn malformed_token_rejected() {
        assert!(WantedSet::parse("season2").is_err());
    }

    #[test]
    fn empty_spec_matches_nothing() {
        let set = WantedSet::parse("").unwrap();
        assert!(set.is_empty());
        assert!(!set.matches(Episode { season: 1, number: 1 }));
    }

    #[test]
    fn requested_episodes_expands_ranges_and_singles() {
        let set = WantedSet::parse("1x1-1x3,2x5").unwrap();
        let mut requested = set.requested_episodes();
        requested.sort_by_key(|e| (e.season, e.number));
        assert_eq!(
            requested,
            vec![
                Episode { season: 1, number: 1 },
                Episode { season: 1, number: 2 },
                Episode { season: 1, number: 3 },
                Episode { season: 2, number: 5 },
            ]
        );
    }
}
