//! Life 1.06 text format: `#` comment lines, then one `<x> <y>` pair per
//! alive cell with the origin at the grid centre.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::error::LifeError;
use crate::grid::{CellStore, Dims, PackedGrid};

pub const HEADER: &str = "#Life 1.06";

/// Reads the alive set for a `dims` grid.
///
/// Coordinates are shifted by half of each dimension; cells that land
/// outside the grid are dropped and duplicates are reported once, in
/// row-major order.
pub fn parse<R: BufRead>(reader: R, dims: Dims) -> Result<Vec<(usize, usize)>, LifeError> {
    let (offset_x, offset_y) = origin(dims);
    let mut alive = Vec::new();
    let mut dropped = 0usize;

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let malformed = || LifeError::MalformedLine {
            line: i + 1,
            content: line.clone(),
        };

        let mut tokens = trimmed.split_whitespace();
        let (Some(x), Some(y), None) = (tokens.next(), tokens.next(), tokens.next()) else {
            return Err(malformed());
        };
        let x: i64 = x.parse().map_err(|_| malformed())?;
        let y: i64 = y.parse().map_err(|_| malformed())?;

        match (shift(x, offset_x, dims.width), shift(y, offset_y, dims.height)) {
            (Some(x), Some(y)) => alive.push((x, y)),
            _ => dropped += 1,
        }
    }

    alive.sort_unstable_by_key(|&(x, y)| (y, x));
    alive.dedup();
    debug!(alive = alive.len(), dropped, "parsed Life 1.06 input");
    Ok(alive)
}

/// Writes every alive cell of `grid` in row-major order.
pub fn write<W: Write>(mut writer: W, grid: &PackedGrid) -> Result<(), LifeError> {
    let (offset_x, offset_y) = origin(grid.dims());
    writeln!(writer, "{HEADER}")?;
    for (x, y) in grid.alive_cells() {
        writeln!(writer, "{} {}", x as i64 - offset_x, y as i64 - offset_y)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_file(path: impl AsRef<Path>, dims: Dims) -> Result<Vec<(usize, usize)>, LifeError> {
    let file = File::open(path)?;
    parse(BufReader::new(file), dims)
}

pub fn write_file(path: impl AsRef<Path>, grid: &PackedGrid) -> Result<(), LifeError> {
    let file = File::create(path)?;
    write(BufWriter::new(file), grid)
}

#[inline]
fn origin(dims: Dims) -> (i64, i64) {
    ((dims.width / 2) as i64, (dims.height / 2) as i64)
}

#[inline]
fn shift(coord: i64, offset: i64, extent: usize) -> Option<usize> {
    let stored = coord.checked_add(offset)?;
    usize::try_from(stored).ok().filter(|&c| c < extent)
}
