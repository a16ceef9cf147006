//! CSV artifacts for grids and paths.
//!
//! Grids are stored as comma-separated cell states (`0`, `1`, `2`), one row per
//! line. Paths are stored as one `x,y` pair of whole screen pixels per line.
//! Neither file has a header row.

use super::{CellState, GridPoint, MapFrame, OccupancyGrid, ScreenPoint};
use crate::error::NavigationError;
use csv::{Reader, ReaderBuilder, StringRecord, Trim, Writer, WriterBuilder};
use std::io;
use std::path::Path;

fn writer<W: io::Write>(inner: W) -> Writer<W> {
    WriterBuilder::new().has_headers(false).from_writer(inner)
}

fn reader_builder() -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    builder.has_headers(false).flexible(true).trim(Trim::All);
    builder
}

fn into_string(writer: Writer<Vec<u8>>) -> Result<String, NavigationError> {
    let bytes = writer
        .into_inner()
        .map_err(|e| NavigationError::Persistence(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| NavigationError::Persistence(e.to_string()))
}

/// 1-based line a record starts on.
fn record_line(record: &StringRecord) -> usize {
    record.position().map_or(0, |p| p.line() as usize)
}

/// Whitespace-only lines come through as a single empty field.
fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(str::is_empty)
}

fn write_grid_records<W: io::Write>(out: &mut Writer<W>, grid: &OccupancyGrid) -> Result<(), NavigationError> {
    for row in grid.rows() {
        out.write_record(row.iter().map(|c| c.as_u8().to_string()))?;
    }
    out.flush()?;
    Ok(())
}

fn read_grid_records<R: io::Read>(mut input: Reader<R>, frame: MapFrame) -> Result<OccupancyGrid, NavigationError> {
    let mut grid = OccupancyGrid::new(frame);
    let mut rows = 0usize;
    let mut last_line = 0usize;

    for record in input.records() {
        let record = record?;
        if is_blank(&record) {
            continue;
        }
        let line = record_line(&record);
        last_line = line;
        if rows >= frame.height {
            return Err(NavigationError::MalformedGrid {
                line,
                reason: format!("expected {} rows", frame.height),
            });
        }
        if record.len() != frame.width {
            return Err(NavigationError::MalformedGrid {
                line,
                reason: format!("row has {} values, expected {}", record.len(), frame.width),
            });
        }

        for (col, value) in record.iter().enumerate() {
            let state = value
                .parse::<u8>()
                .ok()
                .and_then(CellState::from_u8)
                .ok_or_else(|| NavigationError::MalformedGrid {
                    line,
                    reason: format!("invalid cell value '{}' in column {}", value, col + 1),
                })?;
            grid.set_cell(GridPoint::new(col as i32, rows as i32), state);
        }
        rows += 1;
    }

    if rows != frame.height {
        return Err(NavigationError::MalformedGrid {
            line: last_line + 1,
            reason: format!("found {} rows, expected {}", rows, frame.height),
        });
    }
    Ok(grid)
}

fn write_path_records<W: io::Write>(out: &mut Writer<W>, path: &[ScreenPoint]) -> Result<(), NavigationError> {
    for p in path {
        out.write_record(&[(p.x.round() as i64).to_string(), (p.y.round() as i64).to_string()])?;
    }
    out.flush()?;
    Ok(())
}

fn read_path_records<R: io::Read>(mut input: Reader<R>) -> Result<Vec<ScreenPoint>, NavigationError> {
    let mut points = Vec::new();
    for record in input.records() {
        let record = record?;
        if is_blank(&record) {
            continue;
        }
        let line = record_line(&record);
        let (Some(x), Some(y), 2) = (record.get(0), record.get(1), record.len()) else {
            return Err(NavigationError::MalformedPath {
                line,
                reason: "expected exactly two comma-separated values".to_string(),
            });
        };
        let parse = |v: &str| {
            v.parse::<i64>().map_err(|_| NavigationError::MalformedPath {
                line,
                reason: format!("'{}' is not an integer", v),
            })
        };
        points.push(ScreenPoint::new(parse(x)? as f64, parse(y)? as f64));
    }
    Ok(points)
}

/// Renders a grid as CSV text.
pub fn format_grid(grid: &OccupancyGrid) -> Result<String, NavigationError> {
    let mut out = writer(Vec::with_capacity(grid.width() * grid.height() * 2));
    write_grid_records(&mut out, grid)?;
    into_string(out)
}

/// Parses CSV text into a grid over `frame`.
///
/// Every row must have exactly `frame.width` values in `0..=2` and there must
/// be exactly `frame.height` rows. Blank lines are ignored.
pub fn parse_grid(text: &str, frame: MapFrame) -> Result<OccupancyGrid, NavigationError> {
    read_grid_records(reader_builder().from_reader(text.as_bytes()), frame)
}

/// Writes a grid to `path`, replacing any previous contents.
pub fn write_grid(path: impl AsRef<Path>, grid: &OccupancyGrid) -> Result<(), NavigationError> {
    let mut out = WriterBuilder::new().has_headers(false).from_path(path)?;
    write_grid_records(&mut out, grid)
}

/// Reads a grid from `path` and validates it against `frame`.
pub fn read_grid(path: impl AsRef<Path>, frame: MapFrame) -> Result<OccupancyGrid, NavigationError> {
    read_grid_records(reader_builder().from_path(path)?, frame)
}

/// Renders a path as `x,y` lines, rounded to whole pixels.
pub fn format_path(path: &[ScreenPoint]) -> Result<String, NavigationError> {
    let mut out = writer(Vec::new());
    write_path_records(&mut out, path)?;
    into_string(out)
}

/// Parses `x,y` lines into screen points. Blank lines are ignored.
pub fn parse_path(text: &str) -> Result<Vec<ScreenPoint>, NavigationError> {
    read_path_records(reader_builder().from_reader(text.as_bytes()))
}

/// Writes a path to `path`, replacing any previous contents.
pub fn write_path(path: impl AsRef<Path>, waypoints: &[ScreenPoint]) -> Result<(), NavigationError> {
    let mut out = WriterBuilder::new().has_headers(false).from_path(path)?;
    write_path_records(&mut out, waypoints)
}

/// Reads a path from `path`.
pub fn read_path(path: impl AsRef<Path>) -> Result<Vec<ScreenPoint>, NavigationError> {
    read_path_records(reader_builder().from_path(path)?)
}
