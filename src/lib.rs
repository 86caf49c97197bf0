/*!
# Future Jobs Forecast Report

A single-page classroom report about how occupations change over time, served
from Rust.

## Overview

A teacher or student uploads a spreadsheet of employment statistics (years down
the first column, occupations across the header row), picks an occupation and a
year range, and looks at line charts of the counts. Around the charts the page
shows fixed lesson material: learning objectives, a review video, links to the
data sources and a closing assignment. A text box at the bottom collects each
student's reflection into a CSV file on the server.

## Pipeline

Each request runs the same synchronous pipeline over an immutable table:

1. **loader** - `.xlsx`/`.xls` bytes to a [`Table`](table::Table); blank or
   non-numeric counts become zero and are tallied in a coercion report
2. **filter** - an explicit [`Selection`](filter::Selection) is clamped against
   the table's years and sliced into a [`FilteredView`](filter::FilteredView)
3. **graph** - the view becomes a PNG line chart
4. **downloader** - the view becomes a CSV or XLSX download

Reflections go to [`ReflectionLog`](reflection::ReflectionLog), an append-only
one-column CSV store. Writers hold an exclusive file lock while they validate
the store and append, so concurrent students never overwrite each other.

## Modules

- **table**: Table, rows, year bounds and the clamp rules of the year sliders
- **loader**: workbook ingestion and numeric coercion
- **filter**: selections and filtered views
- **reflection**: the reflection store
- **graph**: chart rendering (feature `web`)
- **downloader**: CSV/XLSX export (feature `web`)
- **content**: fixed lesson text
- **config**: server settings
- **app**: routing and handlers (feature `web`)

## REST API Endpoints

- `GET /` - the report page
- `POST /api/upload` - multipart field `file`; loads the table for this browser session
- `GET /api/table` - occupations, year bounds and coercion report
- `GET /api/view` - filtered rows for `occupation`, `compare`, `start`, `end`
- `GET /api/chart/single`, `GET /api/chart/compare` - PNG charts
- `GET /api/export?format=csv|xlsx` - download of the comparison view
- `GET /api/reflections`, `POST /api/reflections` - read and append reflections
*/

pub mod config;
pub mod content;
pub mod error;
pub mod filter;
pub mod loader;
pub mod reflection;
pub mod table;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod downloader;
#[cfg(feature = "web")]
pub mod graph;

pub use error::{ConfigError, IngestionError, PersistenceError, RangeError};
pub use filter::{FilteredView, Selection, filter};
pub use loader::load_workbook;
pub use reflection::{ReflectionEntry, ReflectionLog};
pub use table::{Table, YearBounds, YearRange};
