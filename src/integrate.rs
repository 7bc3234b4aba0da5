use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, Row, Transaction, params};
use serde::Deserialize;
use tracing::{info, warn};

use crate::ingest::{parse_date, parse_kickoff, read_matches_csv};
use crate::match_record::{
    MarketOdds, MatchRecord, MatchResult, MatchTable, StatColumn, StatLine, Venue, Weather,
};
use crate::team_names::TeamAliases;

/// Raw inputs of one refresh. Odds and weather are optional side tables keyed
/// by `match_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSources {
    pub matches: PathBuf,
    pub odds: Option<PathBuf>,
    pub weather: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegratedMatch {
    pub record: MatchRecord,
    pub weather_condition: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub matches: usize,
    pub with_odds: usize,
    pub with_weather: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct OddsRow {
    match_id: String,
    #[serde(default)]
    home_win_odds: Option<f64>,
    #[serde(default)]
    draw_odds: Option<f64>,
    #[serde(default)]
    away_win_odds: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct WeatherRow {
    match_id: String,
    #[serde(default)]
    temperature_c: Option<f64>,
    #[serde(default)]
    precipitation_mm: Option<f64>,
    #[serde(default)]
    wind_kph: Option<f64>,
    #[serde(default)]
    humidity: Option<f64>,
    #[serde(default)]
    condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReading {
    pub weather: Weather,
    pub condition: Option<String>,
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS integrated_matches (
            row_order INTEGER PRIMARY KEY,
            match_date TEXT NOT NULL,
            kickoff TEXT NULL,
            team TEXT NOT NULL,
            opponent TEXT NOT NULL,
            venue TEXT NOT NULL,
            result TEXT NOT NULL,
            gf REAL NOT NULL,
            ga REAL NOT NULL,
            sh REAL NOT NULL,
            sot REAL NOT NULL,
            dist REAL NULL,
            fk REAL NULL,
            pk REAL NULL,
            pkatt REAL NULL,
            match_id TEXT NULL,
            season TEXT NULL,
            home_win_odds REAL NULL,
            draw_odds REAL NULL,
            away_win_odds REAL NULL,
            temperature_c REAL NULL,
            precipitation_mm REAL NULL,
            wind_kph REAL NULL,
            humidity REAL NULL,
            weather_condition TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_integrated_team ON integrated_matches(team);
        CREATE INDEX IF NOT EXISTS idx_integrated_match_id ON integrated_matches(match_id);

        CREATE TABLE IF NOT EXISTS integrated_stat_columns (
            name TEXT PRIMARY KEY
        );
        "#,
    )
    .context("create integrated_matches schema")?;
    Ok(())
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create database directory {}", parent.display()))?;
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

fn read_side_table<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<Vec<T>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("open {what} csv {}", path.display()))?;
    let mut out = Vec::new();
    for (i, row) in rdr.deserialize().enumerate() {
        match row {
            Ok(v) => out.push(v),
            Err(err) => warn!(row = i, "skipping malformed {what} row: {err}"),
        }
    }
    Ok(out)
}

/// Mean odds per `match_id` across bookmakers.
///
/// Each price is averaged over the rows that carry it. A match keeps its odds
/// only when all three means are above 1.0.
pub fn average_odds(path: &Path) -> Result<HashMap<String, MarketOdds>> {
    let rows: Vec<OddsRow> = read_side_table(path, "odds")?;
    let mut sums: HashMap<String, [(f64, usize); 3]> = HashMap::new();
    for row in rows {
        let slot = sums.entry(row.match_id).or_default();
        for (acc, price) in slot
            .iter_mut()
            .zip([row.home_win_odds, row.draw_odds, row.away_win_odds])
        {
            if let Some(p) = price.filter(|p| p.is_finite()) {
                acc.0 += p;
                acc.1 += 1;
            }
        }
    }

    let mut out = HashMap::new();
    for (match_id, slot) in sums {
        let mean = |(sum, n): (f64, usize)| (n > 0).then(|| sum / n as f64).filter(|m| *m > 1.0);
        match (mean(slot[0]), mean(slot[1]), mean(slot[2])) {
            (Some(home_win), Some(draw), Some(away_win)) => {
                out.insert(
                    match_id,
                    MarketOdds {
                        home_win,
                        draw,
                        away_win,
                    },
                );
            }
            _ => warn!(%match_id, "incomplete odds after averaging, ignored"),
        }
    }
    info!(path = %path.display(), matches = out.len(), "averaged bookmaker odds");
    Ok(out)
}

/// Weather per `match_id`. The first row for a match wins.
pub fn weather_by_match(path: &Path) -> Result<HashMap<String, WeatherReading>> {
    let rows: Vec<WeatherRow> = read_side_table(path, "weather")?;
    let mut out: HashMap<String, WeatherReading> = HashMap::new();
    for row in rows {
        if out.contains_key(&row.match_id) {
            warn!(match_id = %row.match_id, "duplicate weather row, keeping the first");
            continue;
        }
        out.insert(
            row.match_id,
            WeatherReading {
                weather: Weather {
                    temperature_c: row.temperature_c,
                    precipitation_mm: row.precipitation_mm,
                    wind_kph: row.wind_kph,
                    humidity: row.humidity,
                },
                condition: row.condition.filter(|c| !c.is_empty()),
            },
        );
    }
    info!(path = %path.display(), matches = out.len(), "loaded weather rows");
    Ok(out)
}

/// Left-join odds and weather onto match rows by `match_id`.
///
/// Rows without a `match_id`, or with no side-table entry, keep whatever odds
/// and weather the match file itself carried.
pub fn integrate(
    table: &MatchTable,
    odds: &HashMap<String, MarketOdds>,
    weather: &HashMap<String, WeatherReading>,
) -> Vec<IntegratedMatch> {
    table
        .records
        .iter()
        .map(|r| {
            let mut record = r.clone();
            let mut weather_condition = None;
            if let Some(id) = r.match_id.as_deref() {
                if let Some(o) = odds.get(id) {
                    record.odds = Some(*o);
                }
                if let Some(w) = weather.get(id) {
                    record.weather = Some(w.weather);
                    weather_condition = w.condition.clone();
                }
            }
            IntegratedMatch {
                record,
                weather_condition,
            }
        })
        .collect()
}

fn insert_row(tx: &Transaction<'_>, order: usize, m: &IntegratedMatch) -> Result<()> {
    let r = &m.record;
    let w = r.weather.unwrap_or_default();
    tx.execute(
        r#"
        INSERT INTO integrated_matches (
            row_order, match_date, kickoff, team, opponent, venue, result,
            gf, ga, sh, sot, dist, fk, pk, pkatt,
            match_id, season,
            home_win_odds, draw_odds, away_win_odds,
            temperature_c, precipitation_mm, wind_kph, humidity, weather_condition
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7,
            ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
            ?16, ?17,
            ?18, ?19, ?20,
            ?21, ?22, ?23, ?24, ?25
        )
        "#,
        params![
            order as i64,
            r.date.format("%Y-%m-%d").to_string(),
            r.kickoff.map(|t| t.format("%H:%M").to_string()),
            r.team,
            r.opponent,
            r.venue.label(),
            r.result.label(),
            r.stats.goals_for,
            r.stats.goals_against,
            r.stats.shots,
            r.stats.shots_on_target,
            r.stats.distance,
            r.stats.free_kicks,
            r.stats.penalties,
            r.stats.penalty_attempts,
            r.match_id,
            r.season,
            r.odds.map(|o| o.home_win),
            r.odds.map(|o| o.draw),
            r.odds.map(|o| o.away_win),
            w.temperature_c,
            w.precipitation_mm,
            w.wind_kph,
            w.humidity,
            m.weather_condition,
        ],
    )
    .with_context(|| format!("insert integrated row {order}"))?;
    Ok(())
}

/// Replace the stored integrated table in one transaction.
pub fn load_integrated(
    conn: &mut Connection,
    rows: &[IntegratedMatch],
    stat_columns: &BTreeSet<StatColumn>,
) -> Result<usize> {
    let tx = conn.transaction().context("begin load transaction")?;
    tx.execute("DELETE FROM integrated_matches", [])
        .context("clear integrated_matches")?;
    tx.execute("DELETE FROM integrated_stat_columns", [])
        .context("clear integrated_stat_columns")?;
    for column in stat_columns {
        tx.execute(
            "INSERT INTO integrated_stat_columns (name) VALUES (?1)",
            params![column.key()],
        )
        .context("insert stat column")?;
    }
    for (i, row) in rows.iter().enumerate() {
        insert_row(&tx, i, row)?;
    }
    tx.commit().context("commit load transaction")?;
    info!(rows = rows.len(), "integrated matches loaded");
    Ok(rows.len())
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<(MatchRecord, Option<String>)> {
    let raw_date: String = row.get(0)?;
    let raw_kickoff: Option<String> = row.get(1)?;
    let raw_venue: String = row.get(4)?;
    let raw_result: String = row.get(5)?;
    let odds = match (
        row.get::<_, Option<f64>>(16)?,
        row.get::<_, Option<f64>>(17)?,
        row.get::<_, Option<f64>>(18)?,
    ) {
        (Some(home_win), Some(draw), Some(away_win)) => Some(MarketOdds {
            home_win,
            draw,
            away_win,
        }),
        _ => None,
    };
    let weather = Weather {
        temperature_c: row.get(19)?,
        precipitation_mm: row.get(20)?,
        wind_kph: row.get(21)?,
        humidity: row.get(22)?,
    };
    let record = MatchRecord {
        date: parse_date(&raw_date).unwrap_or(NaiveDate::MIN),
        kickoff: raw_kickoff.as_deref().and_then(parse_kickoff),
        team: row.get(2)?,
        opponent: row.get(3)?,
        venue: Venue::parse(&raw_venue).unwrap_or(Venue::Home),
        result: MatchResult::parse(&raw_result).unwrap_or(MatchResult::Draw),
        stats: StatLine {
            goals_for: row.get(6)?,
            goals_against: row.get(7)?,
            shots: row.get(8)?,
            shots_on_target: row.get(9)?,
            distance: row.get(10)?,
            free_kicks: row.get(11)?,
            penalties: row.get(12)?,
            penalty_attempts: row.get(13)?,
        },
        odds,
        weather: (weather != Weather::default()).then_some(weather),
        match_id: row.get(14)?,
        season: row.get(15)?,
    };
    Ok((record, row.get(23)?))
}

/// Read the integrated table back in load order.
pub fn read_integrated(conn: &Connection) -> Result<MatchTable> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                match_date, kickoff, team, opponent, venue, result,
                gf, ga, sh, sot, dist, fk, pk, pkatt,
                match_id, season,
                home_win_odds, draw_odds, away_win_odds,
                temperature_c, precipitation_mm, wind_kph, humidity, weather_condition
            FROM integrated_matches
            ORDER BY row_order ASC
            "#,
        )
        .context("prepare integrated query")?;
    let rows = stmt
        .query_map([], record_from_row)
        .context("query integrated matches")?;
    let mut records = Vec::new();
    for row in rows {
        records.push(row.context("decode integrated row")?.0);
    }

    let mut stmt = conn
        .prepare("SELECT name FROM integrated_stat_columns")
        .context("prepare stat column query")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("query stat columns")?;
    let mut stat_columns = BTreeSet::new();
    for name in names {
        let name = name.context("decode stat column")?;
        if let Some(column) = StatColumn::ALL.into_iter().find(|c| c.key() == name) {
            stat_columns.insert(column);
        }
    }
    Ok(MatchTable::new(records, stat_columns))
}

/// Extract, integrate and load. `Ok(None)` means there was no match data and
/// nothing was written.
pub fn full_data_refresh(
    conn: &mut Connection,
    sources: &RefreshSources,
    aliases: &TeamAliases,
    processing_date: NaiveDate,
) -> Result<Option<RefreshSummary>> {
    info!("starting full data refresh");
    if !sources.matches.exists() {
        warn!(path = %sources.matches.display(), "match data file not found");
        return Ok(None);
    }
    let ingested = read_matches_csv(&sources.matches, aliases, processing_date)
        .with_context(|| format!("extract matches from {}", sources.matches.display()))?;
    if ingested.table.is_empty() {
        warn!("no match data available");
        return Ok(None);
    }

    let odds = match sources.odds.as_deref() {
        Some(path) if path.exists() => average_odds(path)?,
        Some(path) => {
            warn!(path = %path.display(), "odds file not found, continuing without odds");
            HashMap::new()
        }
        None => HashMap::new(),
    };
    let weather = match sources.weather.as_deref() {
        Some(path) if path.exists() => weather_by_match(path)?,
        Some(path) => {
            warn!(path = %path.display(), "weather file not found, continuing without weather");
            HashMap::new()
        }
        None => HashMap::new(),
    };

    let rows = integrate(&ingested.table, &odds, &weather);
    load_integrated(conn, &rows, &ingested.table.stat_columns)?;
    let summary = RefreshSummary {
        matches: rows.len(),
        with_odds: rows.iter().filter(|m| m.record.odds.is_some()).count(),
        with_weather: rows.iter().filter(|m| m.record.weather.is_some()).count(),
        warnings: ingested.warnings.len(),
    };
    info!(?summary, "data refresh completed");
    Ok(Some(summary))
}
