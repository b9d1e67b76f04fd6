//! Turns loosely-shaped table rows into [`RankingEntry`] values.
//!
//! Rows arrive as plain strings from either rendered HTML tables or CSV
//! exports, with no stable column layout. Extraction tries the header
//! mapping first (when the source had a recognizable header), then falls back
//! to positional heuristics when the mapped rank or player cell is missing or
//! not numeric. A numeric mapped rank outside 1..=200 rejects the row outright.
//! A row that yields no usable rank or name is dropped by returning `None`;
//! extraction never fails loudly.

use std::sync::{Arc, LazyLock};

use common::Position;
use regex::Regex;

use crate::models::RankingEntry;

pub const MIN_RANK: u32 = 1;
pub const MAX_RANK: u32 = 200;

const RANK_ALIASES: &[&str] = &["rank", "ranking", "#", "rk"];
const PLAYER_ALIASES: &[&str] = &["player", "name"];
const OPPONENT_ALIASES: &[&str] = &["opp", "opponent", "matchup", "vs"];
const POINTS_ALIASES: &[&str] = &["proj", "projection", "points", "fpts", "pts"];
const POSITION_ALIASES: &[&str] = &["pos", "position"];

// Approximate: misclassifies anyone not listed, and unmatched names default to RB.
const TE_KEYWORDS: &[&str] = &[
    "Kelce", "Andrews", "Kittle", "Waller", "Hockenson", "LaPorta", "McBride", "Bowers",
];
const WR_KEYWORDS: &[&str] = &[
    "Chase", "Jefferson", "Hill", "Adams", "Evans", "Brown", "Lamb", "Kupp", "Diggs", "Nacua",
];
const RB_KEYWORDS: &[&str] = &[
    "McCaffrey", "Barkley", "Henry", "Cook", "Kamara", "Robinson", "Gibbs", "Walker", "Jacobs",
];

static MARKDOWN_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static TEAM_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]{2,4}$").unwrap());

/// Column indices recovered from a header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    pub rank: Option<usize>,
    pub player: Option<usize>,
    pub opponent: Option<usize>,
    pub points: Option<usize>,
    pub position: Option<usize>,
}

impl HeaderMap {
    /// Matches header cells case-insensitively against the known aliases.
    /// Exact matches take precedence over word matches, and each column is
    /// claimed by at most one field. Returns `None` unless both a rank and a
    /// player column are found.
    pub fn from_headers<S: AsRef<str>>(headers: &[S]) -> Option<Self> {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| clean_markup(h.as_ref()).to_lowercase())
            .collect();
        let mut claimed: Vec<usize> = Vec::new();
        let mut find = |aliases: &[&str]| {
            let idx = find_column(&normalized, aliases, &claimed, true)
                .or_else(|| find_column(&normalized, aliases, &claimed, false))?;
            claimed.push(idx);
            Some(idx)
        };

        let rank = find(RANK_ALIASES);
        let player = find(PLAYER_ALIASES);
        let opponent = find(OPPONENT_ALIASES);
        let points = find(POINTS_ALIASES);
        let position = find(POSITION_ALIASES);

        (rank.is_some() && player.is_some()).then_some(HeaderMap {
            rank,
            player,
            opponent,
            points,
            position,
        })
    }
}

fn find_column(headers: &[String], aliases: &[&str], claimed: &[usize], exact: bool) -> Option<usize> {
    headers.iter().enumerate().position(|(idx, header)| {
        if claimed.contains(&idx) {
            return false;
        }
        if exact {
            aliases.iter().any(|alias| header == alias)
        } else {
            header
                .split(|c: char| !(c.is_alphanumeric() || c == '#'))
                .any(|word| aliases.contains(&word))
        }
    })
}

/// How a row's cells should be interpreted.
#[derive(Debug, Clone)]
pub enum RowLayout {
    HeaderMapped(Arc<HeaderMap>),
    PositionalGuess,
}

/// One table row as ordered cell strings.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub cells: Vec<String>,
    pub layout: RowLayout,
}

impl RawRow {
    pub fn positional<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
            layout: RowLayout::PositionalGuess,
        }
    }

    pub fn mapped<I, S>(cells: I, header: Arc<HeaderMap>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
            layout: RowLayout::HeaderMapped(header),
        }
    }

    fn cell(&self, idx: usize) -> Option<String> {
        self.cells.get(idx).map(|c| clean_markup(c))
    }
}

/// Fields pulled out of a row before validation and labelling.
#[derive(Debug)]
struct Extracted {
    rank: u32,
    player: String,
    opponent: Option<String>,
    points: Option<f64>,
    explicit_position: Option<String>,
}

/// Extracts a ranking entry from `row`, or `None` when the row is unusable.
pub fn extract(row: &RawRow, position: Position) -> Option<RankingEntry> {
    let extracted = match &row.layout {
        RowLayout::HeaderMapped(header) => match mapped_rank(row, header) {
            // A numeric rank in the rank column is authoritative, even when unusable.
            Some(rank) if !(MIN_RANK..=MAX_RANK).contains(&rank) => return None,
            Some(rank) => extract_mapped(row, header, rank).or_else(|| extract_positional(row)),
            None => extract_positional(row),
        },
        RowLayout::PositionalGuess => extract_positional(row),
    }?;

    if !(MIN_RANK..=MAX_RANK).contains(&extracted.rank) || extracted.player.is_empty() {
        return None;
    }

    let position_rank_label = position.is_flex().then(|| {
        let inferred = extracted
            .explicit_position
            .clone()
            .unwrap_or_else(|| infer_flex_position(&extracted.player).to_string());
        format!("{}{}", inferred, extracted.rank)
    });

    Some(RankingEntry {
        rank: extracted.rank,
        player_name: extracted.player,
        opponent: extracted
            .opponent
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| "TBD".to_string()),
        position_rank_label,
        fantasy_points: extracted.points,
    })
}

fn mapped_rank(row: &RawRow, header: &HeaderMap) -> Option<u32> {
    parse_number(&row.cell(header.rank?)?)
}

fn extract_mapped(row: &RawRow, header: &HeaderMap, rank: u32) -> Option<Extracted> {
    let player_idx = header.player?;
    let player = row.cell(player_idx)?;
    if player.is_empty() {
        return None;
    }

    let opponent = match header.opponent {
        Some(idx) => row.cell(idx),
        None => scan_opponent(row, &[header.rank?, player_idx]),
    };
    let points = header
        .points
        .and_then(|idx| row.cell(idx))
        .and_then(|p| p.parse::<f64>().ok());
    let explicit_position = header
        .position
        .and_then(|idx| row.cell(idx))
        .and_then(|p| flex_slot(&p));

    Some(Extracted {
        rank,
        player,
        opponent,
        points,
        explicit_position,
    })
}

fn extract_positional(row: &RawRow) -> Option<Extracted> {
    let (rank_idx, rank) = row
        .cells
        .iter()
        .take(4)
        .enumerate()
        .find_map(|(idx, cell)| {
            parse_number(&clean_markup(cell))
                .filter(|rank| (MIN_RANK..=MAX_RANK).contains(rank))
                .map(|rank| (idx, rank))
        })?;

    let (player_idx, player) = row
        .cells
        .iter()
        .enumerate()
        .skip(rank_idx + 1)
        .map(|(idx, cell)| (idx, clean_markup(cell)))
        .find(|(_, cell)| looks_like_name(cell))?;

    let opponent = scan_opponent(row, &[rank_idx, player_idx]);
    let explicit_position = row
        .cells
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != rank_idx && *idx != player_idx)
        .find_map(|(_, cell)| flex_slot(&clean_markup(cell)));

    Some(Extracted {
        rank,
        player,
        opponent,
        points: None,
        explicit_position,
    })
}

/// Looks through the last three cells for an opponent: explicit markers
/// (`@`, `vs`) first, then a bare team code.
fn scan_opponent(row: &RawRow, skip: &[usize]) -> Option<String> {
    let start = row.cells.len().saturating_sub(3);
    let candidates: Vec<String> = (start..row.cells.len())
        .rev()
        .filter(|idx| !skip.contains(idx))
        .filter_map(|idx| row.cell(idx))
        .filter(|cell| !cell.is_empty())
        .collect();

    candidates
        .iter()
        .find(|cell| has_opponent_marker(cell))
        .or_else(|| {
            candidates
                .iter()
                .find(|cell| TEAM_CODE.is_match(cell) && !is_position_word(cell))
        })
        .cloned()
}

fn has_opponent_marker(cell: &str) -> bool {
    let lower = cell.to_lowercase();
    cell.contains('@')
        || lower == "vs"
        || lower.starts_with("vs ")
        || lower.starts_with("vs.")
        || lower.contains(" vs ")
}

fn is_position_word(cell: &str) -> bool {
    cell.parse::<Position>().is_ok()
}

fn looks_like_name(cell: &str) -> bool {
    cell.len() > 3
        && cell.contains(' ')
        && !cell.chars().all(|c| c.is_ascii_digit() || c.is_whitespace())
        && !has_opponent_marker(cell)
}

/// An explicit RB/WR/TE tag usable as a FLEX label.
fn flex_slot(cell: &str) -> Option<String> {
    let upper = cell.trim().to_uppercase();
    matches!(upper.as_str(), "RB" | "WR" | "TE").then_some(upper)
}

/// An all-digit cell (a trailing `.` allowed) as a number. Digit strings too
/// long for `u32` saturate so they still read as out of range.
fn parse_number(cell: &str) -> Option<u32> {
    let digits = cell.trim().trim_end_matches('.');
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(digits.parse::<u32>().unwrap_or(u32::MAX))
}

/// Strips image markup, HTML tags and carriage returns, then collapses whitespace.
pub fn clean_markup(raw: &str) -> String {
    let without_images = MARKDOWN_IMAGE.replace_all(raw, "");
    let without_tags = HTML_TAG.replace_all(&without_images, "");
    let without_cr = without_tags.replace('\r', "");
    WHITESPACE_RUN
        .replace_all(without_cr.trim(), " ")
        .into_owned()
}

/// Guesses the underlying slot of a FLEX player from curated surname lists.
pub fn infer_flex_position(player: &str) -> &'static str {
    let upper = player.to_uppercase();
    [("TE", TE_KEYWORDS), ("WR", WR_KEYWORDS), ("RB", RB_KEYWORDS)]
        .into_iter()
        .find(|(_, keywords)| keywords.iter().any(|k| upper.contains(&k.to_uppercase())))
        .map(|(tag, _)| tag)
        .unwrap_or("RB")
}
