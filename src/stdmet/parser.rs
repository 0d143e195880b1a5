//! NDBC stdmet historical file parser
//!
//! Historical files are whitespace-aligned text with two header rows:
//! ```text
//! #YY  MM DD hh mm WDIR WSPD GST  WVHT   DPD   APD MWD   PRES  ATMP  WTMP  DEWP  VIS  TIDE
//! #yr  mo dy hr mn degT m/s  m/s     m   sec   sec degT   hPa  degC  degC  degC  nmi    ft
//! 2023 01 01 00 00 170  7.0  8.6  1.42  8.33  5.90 146 1019.4  22.6  23.9  18.5 99.0 99.00
//! ```
//! Columns are located by header name, so older layouts (no minute column,
//! `YY`/`YYYY` year, `WD`, `BAR`) parse with the same code.
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::io::BufRead;
use thiserror::Error;
use tracing::{debug, warn};

use crate::db::WeatherSample;
use crate::stdmet::sentinel;

#[derive(Error, Debug)]
pub enum StdmetParseError {
    #[error("File is empty, expected a header row")]
    EmptyFile,

    #[error("File has no header row (first token '{0}' is numeric)")]
    NoHeaderRow(String),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Failed to read line {line}: {source}")]
    Io {
        line: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Measurement columns carried by a stdmet file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measurement {
    WindSpeed,
    AirTemperature,
    WindDirection,
    GustSpeed,
    WaveHeight,
    DominantWavePeriod,
    AverageWavePeriod,
    MeanWaveDirection,
    AirPressure,
    WaterTemperature,
    DewPoint,
    Visibility,
    TideHeight,
}

impl Measurement {
    pub const ALL: [Measurement; 13] = [
        Measurement::WindSpeed,
        Measurement::AirTemperature,
        Measurement::WindDirection,
        Measurement::GustSpeed,
        Measurement::WaveHeight,
        Measurement::DominantWavePeriod,
        Measurement::AverageWavePeriod,
        Measurement::MeanWaveDirection,
        Measurement::AirPressure,
        Measurement::WaterTemperature,
        Measurement::DewPoint,
        Measurement::Visibility,
        Measurement::TideHeight,
    ];

    /// Header names for this column, current name first
    pub fn header_names(self) -> &'static [&'static str] {
        match self {
            Measurement::WindSpeed => &["WSPD"],
            Measurement::AirTemperature => &["ATMP"],
            Measurement::WindDirection => &["WDIR", "WD"],
            Measurement::GustSpeed => &["GST"],
            Measurement::WaveHeight => &["WVHT"],
            Measurement::DominantWavePeriod => &["DPD"],
            Measurement::AverageWavePeriod => &["APD"],
            Measurement::MeanWaveDirection => &["MWD"],
            Measurement::AirPressure => &["PRES", "BAR"],
            Measurement::WaterTemperature => &["WTMP"],
            Measurement::DewPoint => &["DEWP"],
            Measurement::Visibility => &["VIS"],
            Measurement::TideHeight => &["TIDE"],
        }
    }
}

/// Column positions resolved from a header row
#[derive(Debug, Clone)]
pub struct ColumnLayout {
    year: usize,
    month: usize,
    day: usize,
    hour: Option<usize>,
    minute: Option<usize>,
    measurements: [Option<usize>; 13],
}

impl ColumnLayout {
    /// Resolve column positions from the first line of a file
    pub fn from_header(line: &str) -> Result<Self, StdmetParseError> {
        let names: Vec<&str> = line.split_whitespace().collect();
        let first = names.first().ok_or(StdmetParseError::EmptyFile)?;

        if first.parse::<f64>().is_ok() {
            return Err(StdmetParseError::NoHeaderRow(first.to_string()));
        }

        let index: HashMap<&str, usize> = names
            .iter()
            .enumerate()
            .map(|(i, name)| (*name, i))
            .collect();

        let mut measurements = [None; 13];
        for measurement in Measurement::ALL {
            measurements[measurement as usize] = find_column(&index, measurement.header_names());
        }

        let layout = Self {
            year: require_column(&index, "year", &["#YY", "YYYY", "YY", "#YYYY"])?,
            month: require_column(&index, "month", &["MM"])?,
            day: require_column(&index, "day", &["DD"])?,
            hour: find_column(&index, &["hh"]),
            minute: find_column(&index, &["mm"]),
            measurements,
        };

        debug!(
            columns = names.len(),
            measurements = layout.measurements.iter().filter(|m| m.is_some()).count(),
            "Resolved stdmet column layout"
        );

        Ok(layout)
    }

    /// Parse one data row. Returns `None` when no valid timestamp can be built.
    fn parse_row(&self, station_id: &str, line: &str) -> Option<WeatherSample> {
        let tokens: Vec<Option<f64>> = line
            .split_whitespace()
            .map(|token| token.parse::<f64>().ok())
            .collect();
        let value = |column: Option<usize>| column.and_then(|i| tokens.get(i).copied().flatten());

        let year = whole_number(value(Some(self.year))?)?;
        let year = if year < 100 { year + 1900 } else { year };
        let month = whole_number(value(Some(self.month))?)?;
        let day = whole_number(value(Some(self.day))?)?;
        let hour = match value(self.hour) {
            Some(h) => whole_number(h)?,
            None => 0,
        };
        let minute = match value(self.minute) {
            Some(m) => whole_number(m)?,
            None => 0,
        };

        let naive = NaiveDate::from_ymd_opt(year as i32, month, day)?.and_hms_opt(hour, minute, 0)?;
        let sample_datetime = DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc);

        let measured =
            |m: Measurement| sentinel::normalize(value(self.measurements[m as usize]));

        Some(WeatherSample {
            station_id: station_id.to_string(),
            sample_datetime,
            wind_speed_ms: measured(Measurement::WindSpeed),
            air_temperature_c: measured(Measurement::AirTemperature),
            wind_direction_deg: measured(Measurement::WindDirection),
            gust_speed_ms: measured(Measurement::GustSpeed),
            wave_height_m: measured(Measurement::WaveHeight),
            dominant_wave_period_s: measured(Measurement::DominantWavePeriod),
            average_wave_period_s: measured(Measurement::AverageWavePeriod),
            mean_wave_direction_deg: measured(Measurement::MeanWaveDirection),
            air_pressure_hpa: measured(Measurement::AirPressure),
            water_temperature_c: measured(Measurement::WaterTemperature),
            dew_point_c: measured(Measurement::DewPoint),
            visibility_nmi: measured(Measurement::Visibility),
            tide_height_ft: measured(Measurement::TideHeight),
        })
    }
}

fn find_column(index: &HashMap<&str, usize>, aliases: &[&str]) -> Option<usize> {
    aliases.iter().find_map(|alias| index.get(alias).copied())
}

fn require_column(
    index: &HashMap<&str, usize>,
    column: &str,
    aliases: &[&str],
) -> Result<usize, StdmetParseError> {
    find_column(index, aliases).ok_or_else(|| StdmetParseError::MissingColumn(column.to_string()))
}

fn whole_number(value: f64) -> Option<u32> {
    if value.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&value) {
        Some(value as u32)
    } else {
        None
    }
}

/// Parser for one station's decompressed stdmet file
pub struct StdmetParser {
    station_id: String,
}

impl StdmetParser {
    pub fn new(station_id: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
        }
    }

    /// Read the header rows and return a lazy iterator over the data rows.
    ///
    /// Fails before yielding anything when the header is missing or lacks a
    /// date column. The units row (line 2) is always skipped.
    pub fn parse<R: BufRead>(&self, mut reader: R) -> Result<SampleRows<R>, StdmetParseError> {
        let mut buf = Vec::new();

        let header = match read_line_lossy(&mut reader, &mut buf)
            .map_err(|source| StdmetParseError::Io { line: 1, source })?
        {
            Some(line) => line,
            None => return Err(StdmetParseError::EmptyFile),
        };
        let layout = ColumnLayout::from_header(&header)?;

        if let Some(units) = read_line_lossy(&mut reader, &mut buf)
            .map_err(|source| StdmetParseError::Io { line: 2, source })?
        {
            debug!("Skipping units row: {}", units.trim());
        }

        Ok(SampleRows {
            reader,
            buf,
            layout,
            station_id: self.station_id.clone(),
            line_number: 2,
            parsed_rows: 0,
            skipped_rows: 0,
            finished: false,
        })
    }
}

/// Read one line, replacing invalid UTF-8 so bad bytes parse as absent values.
/// Returns `None` at end of input.
fn read_line_lossy<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

/// Lazy, single-pass sequence of samples from one file
pub struct SampleRows<R> {
    reader: R,
    buf: Vec<u8>,
    layout: ColumnLayout,
    station_id: String,
    line_number: usize,
    parsed_rows: usize,
    skipped_rows: usize,
    finished: bool,
}

impl<R> SampleRows<R> {
    /// Data rows turned into samples so far
    pub fn parsed_rows(&self) -> usize {
        self.parsed_rows
    }

    /// Data rows dropped so far because no timestamp could be built
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }
}

impl<R: BufRead> Iterator for SampleRows<R> {
    type Item = Result<WeatherSample, StdmetParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let line = match read_line_lossy(&mut self.reader, &mut self.buf) {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(source) => {
                    self.finished = true;
                    return Some(Err(StdmetParseError::Io {
                        line: self.line_number + 1,
                        source,
                    }));
                }
            };
            self.line_number += 1;

            if line.trim().is_empty() {
                continue;
            }

            match self.layout.parse_row(&self.station_id, &line) {
                Some(sample) => {
                    self.parsed_rows += 1;
                    return Some(Ok(sample));
                }
                None => {
                    self.skipped_rows += 1;
                    warn!(
                        station_id = %self.station_id,
                        line = self.line_number,
                        "Skipping row without a valid timestamp: {}",
                        line.trim()
                    );
                }
            }
        }
    }
}
