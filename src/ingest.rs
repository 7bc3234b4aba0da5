use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use csv::StringRecord;
use tracing::{info, warn};

use crate::error::{DataQualityWarning, IngestError};
use crate::match_record::{
    MarketOdds, MatchRecord, MatchResult, MatchTable, StatColumn, StatLine, Venue, Weather,
};
use crate::team_names::TeamAliases;

pub const REQUIRED_COLUMNS: [&str; 5] = ["date", "team", "opponent", "venue", "result"];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

#[derive(Debug, Clone)]
pub struct Ingested {
    pub table: MatchTable,
    pub warnings: Vec<DataQualityWarning>,
}

/// Header name -> column index, keyed by the normalized header.
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (normalize_header(h), i))
            .collect();
        Self { index }
    }

    fn find(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|n| self.index.get(*n).copied())
    }
}

fn normalize_header(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

fn stat_aliases(column: StatColumn) -> &'static [&'static str] {
    match column {
        StatColumn::GoalsFor => &["gf", "goals_for"],
        StatColumn::GoalsAgainst => &["ga", "goals_against"],
        StatColumn::Shots => &["sh", "shots"],
        StatColumn::ShotsOnTarget => &["sot", "shots_on_target"],
        StatColumn::Distance => &["dist", "distance"],
        StatColumn::FreeKicks => &["fk", "free_kicks"],
        StatColumn::Penalties => &["pk", "penalties"],
        StatColumn::PenaltyAttempts => &["pkatt", "penalty_attempts"],
    }
}

struct Layout {
    date: usize,
    team: usize,
    opponent: usize,
    venue: usize,
    result: usize,
    time: Option<usize>,
    match_id: Option<usize>,
    season: Option<usize>,
    stats: Vec<(StatColumn, usize)>,
    home_odds: Option<usize>,
    draw_odds: Option<usize>,
    away_odds: Option<usize>,
    temperature: Option<usize>,
    precipitation: Option<usize>,
    wind: Option<usize>,
    humidity: Option<usize>,
}

impl Layout {
    fn resolve(headers: &StringRecord) -> Result<Self, IngestError> {
        let cols = Columns::new(headers);
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|name| cols.find(&[name]).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(IngestError::Schema { missing });
        }
        let required = |name: &str| cols.find(&[name]).unwrap_or_default();
        Ok(Self {
            date: required("date"),
            team: required("team"),
            opponent: required("opponent"),
            venue: required("venue"),
            result: required("result"),
            time: cols.find(&["time", "kickoff"]),
            match_id: cols.find(&["match_id"]),
            season: cols.find(&["season"]),
            stats: StatColumn::ALL
                .into_iter()
                .filter_map(|c| cols.find(stat_aliases(c)).map(|i| (c, i)))
                .collect(),
            home_odds: cols.find(&["home_win_odds", "home_odds"]),
            draw_odds: cols.find(&["draw_odds"]),
            away_odds: cols.find(&["away_win_odds", "away_odds"]),
            temperature: cols.find(&["temperature_c", "temperature"]),
            precipitation: cols.find(&["precipitation_mm", "precipitation"]),
            wind: cols.find(&["wind_kph", "wind_speed"]),
            humidity: cols.find(&["humidity"]),
        })
    }

    fn stat_columns(&self) -> BTreeSet<StatColumn> {
        self.stats.iter().map(|(c, _)| *c).collect()
    }
}

pub fn read_matches_csv(
    path: &Path,
    aliases: &TeamAliases,
    processing_date: NaiveDate,
) -> Result<Ingested, IngestError> {
    let file = std::fs::File::open(path)?;
    let out = read_matches(file, aliases, processing_date)?;
    info!(
        path = %path.display(),
        rows = out.table.len(),
        warnings = out.warnings.len(),
        "ingested match rows"
    );
    Ok(out)
}

/// Validate and normalize raw per-team match rows.
///
/// Missing required columns fail the whole read. Everything else is recovered
/// row by row and reported as a `DataQualityWarning`.
pub fn read_matches<R: io::Read>(
    reader: R,
    aliases: &TeamAliases,
    processing_date: NaiveDate,
) -> Result<Ingested, IngestError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    let layout = Layout::resolve(&headers)?;
    let stat_columns = layout.stat_columns();

    let mut records = Vec::new();
    let mut warnings = Vec::new();
    for (row, item) in rdr.records().enumerate() {
        let raw = match item {
            Ok(raw) => raw,
            Err(err) => {
                warnings.push(DataQualityWarning {
                    row,
                    column: "row",
                    message: format!("unreadable row skipped: {err}"),
                });
                continue;
            }
        };
        if let Some(record) = normalize_row(
            row,
            &raw,
            &layout,
            aliases,
            processing_date,
            &mut warnings,
        ) {
            records.push(record);
        }
    }

    for w in &warnings {
        warn!("data quality: {w}");
    }
    Ok(Ingested {
        table: MatchTable::new(records, stat_columns),
        warnings,
    })
}

fn field(raw: &StringRecord, idx: Option<usize>) -> Option<&str> {
    idx.and_then(|i| raw.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
}

pub fn parse_kickoff(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

fn normalize_row(
    row: usize,
    raw: &StringRecord,
    layout: &Layout,
    aliases: &TeamAliases,
    processing_date: NaiveDate,
    warnings: &mut Vec<DataQualityWarning>,
) -> Option<MatchRecord> {
    let mut note = |column: &'static str, message: String| {
        warnings.push(DataQualityWarning {
            row,
            column,
            message,
        });
    };

    let team = aliases.canonical(field(raw, Some(layout.team)).unwrap_or_default());
    let opponent = aliases.canonical(field(raw, Some(layout.opponent)).unwrap_or_default());
    if team.is_empty() || opponent.is_empty() {
        note("team", "empty team or opponent, row dropped".to_string());
        return None;
    }

    let date = match field(raw, Some(layout.date)) {
        Some(s) => match parse_date(s) {
            Some(d) => d,
            None => {
                note("date", format!("unparseable date '{s}', using {processing_date}"));
                processing_date
            }
        },
        None => {
            note("date", format!("missing date, using {processing_date}"));
            processing_date
        }
    };

    let venue_raw = field(raw, Some(layout.venue)).unwrap_or_default();
    let venue = Venue::parse(venue_raw).unwrap_or_else(|| {
        note("venue", format!("invalid venue '{venue_raw}', using Home"));
        Venue::Home
    });

    let kickoff = field(raw, layout.time).and_then(|s| {
        let parsed = parse_kickoff(s);
        if parsed.is_none() {
            note("time", format!("unparseable time '{s}'"));
        }
        parsed
    });

    let mut values: HashMap<StatColumn, f64> = HashMap::new();
    for &(column, idx) in &layout.stats {
        match field(raw, Some(idx)).map(str::parse::<f64>) {
            Some(Ok(v)) if v.is_finite() && v >= 0.0 => {
                values.insert(column, v);
            }
            Some(_) => note(column.key(), "invalid value, using league prior".to_string()),
            None => note(column.key(), "missing value, using league prior".to_string()),
        }
    }

    let result_raw = field(raw, Some(layout.result)).unwrap_or_default();
    let result = match MatchResult::parse(result_raw) {
        Some(r) => r,
        None => match (
            values.get(&StatColumn::GoalsFor),
            values.get(&StatColumn::GoalsAgainst),
        ) {
            (Some(&gf), Some(&ga)) => {
                note("result", format!("invalid result '{result_raw}', derived from goals"));
                MatchResult::from_goals(gf, ga)
            }
            _ => {
                note("result", format!("invalid result '{result_raw}', row dropped"));
                return None;
            }
        },
    };

    let stats = build_stats(layout, &values, result);
    let odds = read_odds(raw, layout, &mut note);
    let weather = read_weather(raw, layout);

    Some(MatchRecord {
        date,
        kickoff,
        team,
        opponent,
        venue,
        result,
        stats,
        odds,
        weather,
        match_id: field(raw, layout.match_id).map(str::to_string),
        season: field(raw, layout.season).map(str::to_string),
    })
}

fn build_stats(layout: &Layout, values: &HashMap<StatColumn, f64>, result: MatchResult) -> StatLine {
    let mut stats = StatLine::default();
    if layout.stats.is_empty() {
        let v = StatColumn::from_result(result);
        for column in StatColumn::CORE {
            stats.set(column, v);
        }
        return stats;
    }
    for column in StatColumn::CORE {
        stats.set(column, column.prior());
    }
    for &(column, _) in &layout.stats {
        stats.set(column, values.get(&column).copied().unwrap_or(column.prior()));
    }
    stats
}

fn read_odds(
    raw: &StringRecord,
    layout: &Layout,
    note: &mut impl FnMut(&'static str, String),
) -> Option<MarketOdds> {
    let prices = [
        field(raw, layout.home_odds),
        field(raw, layout.draw_odds),
        field(raw, layout.away_odds),
    ];
    if prices.iter().all(Option::is_none) {
        return None;
    }
    let parsed: Vec<Option<f64>> = prices
        .iter()
        .map(|p| p.and_then(|s| s.parse::<f64>().ok()).filter(|v| *v > 1.0))
        .collect();
    match parsed.as_slice() {
        [Some(home_win), Some(draw), Some(away_win)] => Some(MarketOdds {
            home_win: *home_win,
            draw: *draw,
            away_win: *away_win,
        }),
        _ => {
            note("odds", "odds incomplete or not above 1.0, ignored".to_string());
            None
        }
    }
}

fn read_weather(raw: &StringRecord, layout: &Layout) -> Option<Weather> {
    let num = |idx| field(raw, idx).and_then(|s| s.parse::<f64>().ok());
    let weather = Weather {
        temperature_c: num(layout.temperature),
        precipitation_mm: num(layout.precipitation),
        wind_kph: num(layout.wind),
        humidity: num(layout.humidity),
    };
    (weather != Weather::default()).then_some(weather)
}
