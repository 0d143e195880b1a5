// Parser tests against whole files, including gzip-compressed input

mod common;

use chrono::{TimeZone, Utc};
use flate2::read::MultiGzDecoder;
use ship_weather_service::stdmet::{StdmetParseError, StdmetParser};
use std::io::{BufReader, Cursor};

#[test]
fn test_all_sentinel_row_keeps_key() {
    let content = format!(
        "{}\n{}\n2023 01 01 00 00 9999 9999 9999 9999 9999 9999 9999 9999 9999 9999 9999 9999 9999\n",
        common::HEADER,
        common::UNITS
    );

    let samples: Vec<_> = StdmetParser::new("41002")
        .parse(Cursor::new(content))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(samples.len(), 1);
    let s = &samples[0];
    assert_eq!(s.station_id, "41002");
    assert_eq!(s.sample_datetime, Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
    assert_eq!(s.wind_speed_ms, None);
    assert_eq!(s.air_temperature_c, None);
    assert_eq!(s.wind_direction_deg, None);
    assert_eq!(s.gust_speed_ms, None);
    assert_eq!(s.wave_height_m, None);
    assert_eq!(s.dominant_wave_period_s, None);
    assert_eq!(s.average_wave_period_s, None);
    assert_eq!(s.mean_wave_direction_deg, None);
    assert_eq!(s.air_pressure_hpa, None);
    assert_eq!(s.water_temperature_c, None);
    assert_eq!(s.dew_point_c, None);
    assert_eq!(s.visibility_nmi, None);
    assert_eq!(s.tide_height_ft, None);
}

#[test]
fn test_parse_gzip_stream() {
    let content = common::stdmet_file(&common::rows_for_year(2021, 12));
    let compressed = common::gzip(&content);
    let reader = BufReader::new(MultiGzDecoder::new(Cursor::new(compressed)));

    let mut rows = StdmetParser::new("41002").parse(reader).unwrap();
    let samples: Vec<_> = rows.by_ref().collect::<Result<_, _>>().unwrap();

    assert_eq!(samples.len(), 12);
    assert_eq!(rows.parsed_rows(), 12);
    assert_eq!(rows.skipped_rows(), 0);
    assert!(samples
        .windows(2)
        .all(|w| w[0].sample_datetime < w[1].sample_datetime));
    assert_eq!(samples[11].sample_datetime, Utc.with_ymd_and_hms(2021, 1, 1, 1, 50, 0).unwrap());
}

#[test]
fn test_no_sentinel_survives_parsing() {
    let rows = vec![
        common::row(2022, 5, 1, 0, 0, 99.0, 99.0),
        common::row(2022, 5, 1, 0, 10, 999.0, 9999.0),
        common::row(2022, 5, 1, 0, 20, 3.5, 0.9),
    ];
    let content = common::stdmet_file(&rows);

    let samples: Vec<_> = StdmetParser::new("41002")
        .parse(Cursor::new(content))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    for s in &samples {
        for value in [s.wind_speed_ms, s.wave_height_m, s.visibility_nmi, s.tide_height_ft]
            .into_iter()
            .flatten()
        {
            assert!(![99.0, 999.0, 9999.0].contains(&value));
        }
    }
    assert_eq!(samples[2].wind_speed_ms, Some(3.5));
    assert_eq!(samples[2].wave_height_m, Some(0.9));
}

#[test]
fn test_yyyy_header_alias() {
    let content = "YYYY MM DD hh WD WSPD BAR\nyr mo dy hr degT m/s hPa\n2001 07 04 12 180 4.2 1015.0\n";

    let samples: Vec<_> = StdmetParser::new("42001")
        .parse(Cursor::new(content))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(samples[0].sample_datetime, Utc.with_ymd_and_hms(2001, 7, 4, 12, 0, 0).unwrap());
    assert_eq!(samples[0].wind_direction_deg, Some(180.0));
    assert_eq!(samples[0].air_pressure_hpa, Some(1015.0));
}

#[test]
fn test_headerless_file_is_format_error() {
    let content = format!("{}\n{}\n", common::row(2023, 1, 1, 0, 0, 5.0, 1.0), common::row(2023, 1, 1, 0, 10, 5.0, 1.0));

    let result = StdmetParser::new("41002").parse(Cursor::new(content));

    assert!(matches!(result, Err(StdmetParseError::NoHeaderRow(_))));
}
