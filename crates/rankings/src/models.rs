use std::collections::BTreeMap;

use common::Position;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// One ranked player (or defense) within a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    #[serde(rename = "preGameRank")]
    pub rank: u32,
    #[serde(rename = "player")]
    pub player_name: String,
    #[serde(default)]
    pub opponent: String,
    #[serde(
        rename = "positionRank",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub position_rank_label: Option<String>,
    #[serde(
        rename = "fantasyPoints",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub fantasy_points: Option<f64>,
}

/// Entries for one position, sorted by strictly increasing rank.
///
/// Construction sorts stably and drops later entries that repeat a rank, so
/// the first-seen entry for a rank wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<RankingEntry>", into = "Vec<RankingEntry>")]
pub struct PositionRankingSet {
    entries: Vec<RankingEntry>,
}

impl PositionRankingSet {
    pub fn from_entries(mut entries: Vec<RankingEntry>) -> Self {
        entries.sort_by_key(|e| e.rank);
        entries.dedup_by_key(|e| e.rank);
        Self { entries }
    }

    pub fn entries(&self) -> &[RankingEntry] {
        &self.entries
    }

    /// The first `n` entries (fewer if the set is shorter).
    pub fn head(&self, n: usize) -> &[RankingEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RankingEntry> {
        self.entries.iter()
    }
}

impl From<Vec<RankingEntry>> for PositionRankingSet {
    fn from(entries: Vec<RankingEntry>) -> Self {
        Self::from_entries(entries)
    }
}

impl From<PositionRankingSet> for Vec<RankingEntry> {
    fn from(set: PositionRankingSet) -> Self {
        set.entries
    }
}

/// The canonical artifact: every position's rankings at one point in time.
///
/// Snapshots are never edited; a new scrape produces a new snapshot that
/// replaces the published one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PublishedSnapshot", into = "PublishedSnapshot")]
pub struct RankingsSnapshot {
    positions: BTreeMap<Position, PositionRankingSet>,
    last_updated: String,
    week: u8,
    scraped_at: OffsetDateTime,
    method: String,
}

impl RankingsSnapshot {
    /// `last_updated` starts out as the scrape time; see [`Self::with_last_updated`].
    pub fn new(
        mut positions: BTreeMap<Position, PositionRankingSet>,
        week: u8,
        scraped_at: OffsetDateTime,
        method: impl Into<String>,
    ) -> Self {
        for position in Position::ALL {
            positions.entry(position).or_default();
        }
        let last_updated = format_timestamp(scraped_at);
        Self {
            positions,
            last_updated,
            week,
            scraped_at,
            method: method.into(),
        }
    }

    /// Same rankings stamped with the upstream freshness token.
    pub fn with_last_updated(self, token: impl Into<String>) -> Self {
        Self {
            last_updated: token.into(),
            ..self
        }
    }

    /// Rankings for `position`; an empty set when the position was not scraped.
    pub fn position(&self, position: Position) -> &PositionRankingSet {
        static EMPTY: PositionRankingSet = PositionRankingSet {
            entries: Vec::new(),
        };
        self.positions.get(&position).unwrap_or(&EMPTY)
    }

    pub fn last_updated(&self) -> &str {
        &self.last_updated
    }

    pub fn week(&self) -> u8 {
        self.week
    }

    pub fn scraped_at(&self) -> OffsetDateTime {
        self.scraped_at
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn total_players(&self) -> usize {
        self.positions.values().map(PositionRankingSet::len).sum()
    }

    /// Entry count for every tracked position, zeros included.
    pub fn counts(&self) -> BTreeMap<Position, usize> {
        Position::ALL
            .into_iter()
            .map(|p| (p, self.position(p).len()))
            .collect()
    }

    /// Human-readable per-position counts, e.g. `QB: 32, RB: 45, ...`.
    pub fn summary(&self) -> String {
        self.counts()
            .iter()
            .map(|(position, count)| format!("{}: {}", position, count))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// SHA-256 over rank, player and opponent of every entry of every
    /// position. Metadata (timestamps, week, method, labels) is excluded, so
    /// two scrapes of unchanged rankings hash identically.
    pub fn essential_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for position in Position::ALL {
            hasher.update(position.key().as_bytes());
            hasher.update([0x1d]);
            for entry in self.position(position).iter() {
                hasher.update(entry.rank.to_be_bytes());
                hasher.update(entry.player_name.as_bytes());
                hasher.update([0x1f]);
                hasher.update(entry.opponent.as_bytes());
                hasher.update([0x1e]);
            }
        }
        hex::encode(hasher.finalize())
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

pub fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

fn default_week() -> u8 {
    1
}

/// Wire shape consumed by the front-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishedSnapshot {
    #[serde(default)]
    qb: PositionRankingSet,
    #[serde(default)]
    rb: PositionRankingSet,
    #[serde(default)]
    wr: PositionRankingSet,
    #[serde(default)]
    te: PositionRankingSet,
    #[serde(default)]
    flex: PositionRankingSet,
    #[serde(default)]
    def: PositionRankingSet,
    #[serde(default)]
    k: PositionRankingSet,
    #[serde(default)]
    last_updated: String,
    #[serde(default = "default_week")]
    week: u8,
    #[serde(with = "time::serde::rfc3339", default = "OffsetDateTime::now_utc")]
    scraped_at: OffsetDateTime,
    #[serde(default)]
    scraping_method: String,
    #[serde(default)]
    total_players: usize,
}

impl From<RankingsSnapshot> for PublishedSnapshot {
    fn from(snapshot: RankingsSnapshot) -> Self {
        let total_players = snapshot.total_players();
        let mut positions = snapshot.positions;
        let mut take = |p: Position| positions.remove(&p).unwrap_or_default();
        PublishedSnapshot {
            qb: take(Position::Qb),
            rb: take(Position::Rb),
            wr: take(Position::Wr),
            te: take(Position::Te),
            flex: take(Position::Flex),
            def: take(Position::Def),
            k: take(Position::K),
            last_updated: snapshot.last_updated,
            week: snapshot.week,
            scraped_at: snapshot.scraped_at,
            scraping_method: snapshot.method,
            total_players,
        }
    }
}

impl From<PublishedSnapshot> for RankingsSnapshot {
    fn from(published: PublishedSnapshot) -> Self {
        let positions = BTreeMap::from([
            (Position::Qb, published.qb),
            (Position::Rb, published.rb),
            (Position::Wr, published.wr),
            (Position::Te, published.te),
            (Position::Flex, published.flex),
            (Position::Def, published.def),
            (Position::K, published.k),
        ]);
        RankingsSnapshot {
            positions,
            last_updated: published.last_updated,
            week: published.week,
            scraped_at: published.scraped_at,
            method: published.scraping_method,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn entry(rank: u32, name: &str, opp: &str) -> RankingEntry {
        RankingEntry {
            rank,
            player_name: name.to_string(),
            opponent: opp.to_string(),
            position_rank_label: None,
            fantasy_points: None,
        }
    }

    fn snapshot(scraped_at: OffsetDateTime) -> RankingsSnapshot {
        let mut positions = BTreeMap::new();
        positions.insert(
            Position::Qb,
            PositionRankingSet::from_entries(vec![
                entry(2, "Lamar Jackson", "vs KC"),
                entry(1, "Josh Allen", "vs ARI"),
            ]),
        );
        let mut flex = entry(1, "Justin Jefferson", "@ DAL");
        flex.position_rank_label = Some("WR1".to_string());
        positions.insert(Position::Flex, PositionRankingSet::from_entries(vec![flex]));
        RankingsSnapshot::new(positions, 2, scraped_at, "CSV")
    }

    #[test]
    fn sorts_and_drops_duplicate_ranks_keeping_first_seen() {
        let set = PositionRankingSet::from_entries(vec![
            entry(3, "C", "DAL"),
            entry(1, "A", "NYG"),
            entry(3, "C duplicate", "DAL"),
            entry(2, "B", "SF"),
        ]);
        let names: Vec<&str> = set.iter().map(|e| e.player_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert!(set.entries().windows(2).all(|w| w[0].rank < w[1].rank));
    }

    #[test]
    fn serializes_to_published_schema() {
        let snap = snapshot(datetime!(2025-09-10 12:00 UTC)).with_last_updated("2025-09-08T00:00:00Z");
        let json: serde_json::Value = serde_json::to_value(&snap).unwrap();

        assert_eq!(json["qb"][0]["preGameRank"], 1);
        assert_eq!(json["qb"][0]["player"], "Josh Allen");
        assert_eq!(json["qb"][0]["opponent"], "vs ARI");
        assert!(json["qb"][0].get("positionRank").is_none());
        assert_eq!(json["flex"][0]["positionRank"], "WR1");
        assert_eq!(json["rb"], serde_json::json!([]));
        assert_eq!(json["lastUpdated"], "2025-09-08T00:00:00Z");
        assert_eq!(json["week"], 2);
        assert_eq!(json["scrapedAt"], "2025-09-10T12:00:00Z");
        assert_eq!(json["scrapingMethod"], "CSV");
        assert_eq!(json["totalPlayers"], 3);
    }

    #[test]
    fn round_trips_through_published_json() {
        let snap = snapshot(datetime!(2025-09-10 12:00 UTC));
        let raw = snap.to_json_pretty().unwrap();
        let parsed = RankingsSnapshot::from_json(&raw).unwrap();
        assert_eq!(parsed, snap);
    }

    #[test]
    fn reads_artifacts_with_missing_and_extra_fields() {
        let raw = r#"{
            "qb": [{"preGameRank": 1, "player": "Josh Allen", "opponent": "vs ARI", "actualPoints": 28.3}],
            "forcedAt": "2025-09-09T10:00:00.000Z",
            "scrapedAt": "2025-09-09T10:00:00.000Z"
        }"#;
        let parsed = RankingsSnapshot::from_json(raw).unwrap();
        assert_eq!(parsed.position(Position::Qb).len(), 1);
        assert!(parsed.position(Position::K).is_empty());
        assert_eq!(parsed.week(), 1);
        assert_eq!(parsed.total_players(), 1);
    }

    #[test]
    fn essential_hash_ignores_metadata() {
        let a = snapshot(datetime!(2025-09-10 12:00 UTC));
        let b = snapshot(datetime!(2025-09-11 08:30 UTC)).with_last_updated("later");
        assert_eq!(a.essential_hash(), b.essential_hash());
    }

    #[test]
    fn essential_hash_tracks_ranking_changes() {
        let base = snapshot(datetime!(2025-09-10 12:00 UTC));

        let mut positions = BTreeMap::new();
        positions.insert(
            Position::Qb,
            PositionRankingSet::from_entries(vec![
                entry(1, "Josh Allen", "vs ARI"),
                entry(2, "Lamar Jackson", "@ KC"),
            ]),
        );
        positions.insert(Position::Flex, base.position(Position::Flex).clone());
        let changed = RankingsSnapshot::new(positions, 2, base.scraped_at(), "CSV");

        assert_ne!(base.essential_hash(), changed.essential_hash());
    }

    #[test]
    fn summary_lists_every_position() {
        let snap = snapshot(datetime!(2025-09-10 12:00 UTC));
        assert_eq!(
            snap.summary(),
            "QB: 2, RB: 0, WR: 0, TE: 0, FLEX: 1, DEF: 0, K: 0"
        );
    }
}
