use chrono::{NaiveDate, NaiveDateTime};
use clap::Parser;
use photoscribe::engine::tools::{
    ArtifactLayout, display_relative, format_datetime, has_allowed_extension, is_os_hidden_file,
    lexicographic_cmp, natural_cmp, normalize_extensions, path_relative_to, render_template,
    truncate_chars,
};
use photoscribe::engine::{Cli, apply_cli_to_opts, read_prompt};
use photoscribe::geocode::{Backoff, GeocodeError};
use photoscribe::metadata::dates::{range_from_directories, range_from_filename};
use photoscribe::metadata::{ExifMetadata, MetadataSource};
use photoscribe::pipeline::list_pipelines;
use photoscribe::search::TimeRange;
use photoscribe::utils::{
    apply_env_to_opts, apply_file_to_opts, check_backpressure, parse_file_config, set_verbose,
    setup_logging,
};
use photoscribe::{Opts, PipelineKind, SortOrder};
use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(h, min, s))
        .unwrap()
}

// --- path_relative_to / display_relative ---

#[test]
fn test_path_relative_under_base() {
    let base = PathBuf::from("/photos");
    let path = PathBuf::from("/photos/2022/img.jpg");
    assert_eq!(
        path_relative_to(&path, &base),
        Some(PathBuf::from("2022/img.jpg"))
    );
}

#[test]
fn test_path_relative_not_under_base() {
    let base = PathBuf::from("/photos");
    let path = PathBuf::from("/other/img.jpg");
    assert_eq!(path_relative_to(&path, &base), None);
}

#[test]
fn test_display_relative_root_itself_shows_full_path() {
    let root = Path::new("/photos");
    assert_eq!(display_relative(root, Some(root)), "/photos");
    assert_eq!(
        display_relative(Path::new("/photos/a.jpg"), Some(root)),
        "a.jpg"
    );
    assert_eq!(display_relative(Path::new("/x/a.jpg"), None), "/x/a.jpg");
}

// --- file filters ---

#[test]
fn test_os_hidden_files() {
    assert!(is_os_hidden_file(Path::new("/a/.DS_Store")));
    assert!(is_os_hidden_file(Path::new("/a/._IMG_0001.jpg")));
    assert!(is_os_hidden_file(Path::new("/a/Thumbs.db")));
    assert!(!is_os_hidden_file(Path::new("/a/IMG_0001.jpg")));
}

#[test]
fn test_allowed_extension_case_insensitive() {
    let allowed = normalize_extensions(&["jpg", ".PNG"]);
    assert_eq!(allowed, vec![".jpg".to_string(), ".png".to_string()]);
    assert!(has_allowed_extension(Path::new("a/IMG.JPG"), &allowed));
    assert!(has_allowed_extension(Path::new("a/x.png"), &allowed));
    assert!(!has_allowed_extension(Path::new("a/x.jpg.txt"), &allowed));
    assert!(!has_allowed_extension(Path::new("a/noext"), &allowed));
}

#[test]
fn test_normalize_extensions_drops_empty() {
    assert_eq!(normalize_extensions(&[" .Webp ", "", "."]), vec![".webp"]);
}

// --- artifact layout ---

#[test]
fn test_artifact_layout_in_place() {
    let layout = ArtifactLayout::new("/photos", "/photos", ".txt", ".error.txt");
    let img = Path::new("/photos/trip/a.jpg");
    assert_eq!(layout.primary(img), PathBuf::from("/photos/trip/a.jpg.txt"));
    assert_eq!(
        layout.error(img),
        PathBuf::from("/photos/trip/a.jpg.error.txt")
    );
}

#[test]
fn test_artifact_layout_mirrors_into_output_root() {
    let layout = ArtifactLayout::new("/photos", "/out", ".txt", ".error.txt");
    assert_eq!(
        layout.primary(Path::new("/photos/trip/a.jpg")),
        PathBuf::from("/out/trip/a.jpg.txt")
    );
    let enhanced = layout.with_suffixes(".enhanced.txt", ".enhanced.error.txt");
    assert_eq!(
        enhanced.error(Path::new("/photos/a.jpg")),
        PathBuf::from("/out/a.jpg.enhanced.error.txt")
    );
}

#[test]
fn test_artifact_layout_outside_root_stays_next_to_file() {
    let layout = ArtifactLayout::new("/photos", "/out", ".txt", ".error.txt");
    assert_eq!(
        layout.primary(Path::new("/elsewhere/b.jpg")),
        PathBuf::from("/elsewhere/b.jpg.txt")
    );
}

// --- ordering ---

#[test]
fn test_natural_order_numbers_by_value() {
    assert_eq!(natural_cmp("img2.jpg", "img10.jpg"), Ordering::Less);
    assert_eq!(natural_cmp("IMG10.jpg", "img2.jpg"), Ordering::Greater);
    assert_eq!(natural_cmp("img007", "img7"), Ordering::Equal);
    assert_eq!(natural_cmp("a", "a1"), Ordering::Less);
}

#[test]
fn test_lexicographic_order_is_plain() {
    assert_eq!(lexicographic_cmp("img10.jpg", "img2.jpg"), Ordering::Less);
    assert_eq!(lexicographic_cmp("B.jpg", "a.jpg"), Ordering::Greater);
}

#[test]
fn test_sort_order_sorts_names() {
    let mut names = vec!["img10.jpg", "img2.jpg", "img1.jpg"];
    names.sort_by(|a, b| SortOrder::NaturalAsc.compare(a, b));
    assert_eq!(names, vec!["img1.jpg", "img2.jpg", "img10.jpg"]);
    names.sort_by(|a, b| SortOrder::NaturalDesc.compare(a, b));
    assert_eq!(names, vec!["img10.jpg", "img2.jpg", "img1.jpg"]);
    names.sort_by(|a, b| SortOrder::LexicographicAsc.compare(a, b));
    assert_eq!(names, vec!["img1.jpg", "img10.jpg", "img2.jpg"]);
}

#[test]
fn test_sort_order_parse_and_aliases() {
    assert_eq!(SortOrder::default(), SortOrder::NaturalDesc);
    assert_eq!(
        "name-asc".parse::<SortOrder>().unwrap(),
        SortOrder::NaturalAsc
    );
    assert_eq!(
        "Name-Desc".parse::<SortOrder>().unwrap(),
        SortOrder::NaturalDesc
    );
    assert_eq!(
        "lexicographic-desc".parse::<SortOrder>().unwrap(),
        SortOrder::LexicographicDesc
    );
    assert!("random".parse::<SortOrder>().is_err());
    assert_eq!(SortOrder::LexicographicAsc.to_string(), "lexicographic-asc");
}

#[test]
fn test_pipeline_kind_parse_and_list() {
    assert_eq!(
        "describe".parse::<PipelineKind>().unwrap(),
        PipelineKind::Describe
    );
    assert_eq!(
        "geocode".parse::<PipelineKind>().unwrap(),
        PipelineKind::Geolocate
    );
    assert!("resize".parse::<PipelineKind>().is_err());
    let names: Vec<&str> = list_pipelines().iter().map(|(n, _)| *n).collect();
    assert_eq!(names, vec!["describe", "enhance", "geolocate"]);
}

// --- templates ---

#[test]
fn test_render_template_fills_known_keys() {
    let out = render_template(
        "{datetime} at {location}: {content}",
        &[
            ("datetime", "2022-01-03"),
            ("location", "Paris"),
            ("content", "A cat"),
        ],
    );
    assert_eq!(out, "2022-01-03 at Paris: A cat");
}

#[test]
fn test_render_template_keeps_unknown_and_does_not_reexpand() {
    let out = render_template(
        "{a} {unknown} {",
        &[("a", "{a}"), ("b", "never")],
    );
    assert_eq!(out, "{a} {unknown} {");
}

#[test]
fn test_truncate_chars() {
    assert_eq!(truncate_chars("hello", 10), "hello");
    assert_eq!(truncate_chars("hello", 5), "hello");
    assert_eq!(truncate_chars("hello world", 5), "hello...");
    assert_eq!(truncate_chars("héllo", 2), "hé...");
}

#[test]
fn test_format_datetime_drops_midnight() {
    assert_eq!(format_datetime(&at(2022, 1, 3, 0, 0, 0)), "2022-01-03");
    assert_eq!(
        format_datetime(&at(2022, 1, 3, 14, 25, 30)),
        "2022-01-03 14:25:30"
    );
}

// --- dates from names ---

#[test]
fn test_filename_timestamp_is_exact() {
    let r = range_from_filename("IMG_20220103_142530.jpg").unwrap();
    assert!(r.is_exact());
    assert_eq!(r.min, at(2022, 1, 3, 14, 25, 30));
}

#[test]
fn test_filename_date_covers_whole_day() {
    let day = TimeRange::whole_day(NaiveDate::from_ymd_opt(2022, 1, 3).unwrap());
    assert_eq!(range_from_filename("PXL-20220103-beach.jpg"), Some(day));
    assert_eq!(range_from_filename("20220103.jpg"), Some(day));
    assert_eq!(range_from_filename("2022-01-03 party.jpg"), Some(day));
    assert_eq!(day.max, at(2022, 1, 3, 23, 59, 59));
}

#[test]
fn test_filename_without_date() {
    assert_eq!(range_from_filename("holiday.jpg"), None);
    assert_eq!(range_from_filename("IMG_20221399.jpg"), None);
}

#[test]
fn test_directory_date_deepest_first() {
    let r = range_from_directories(
        Path::new("/photos/2021-07-01 summer/2021-07-04 trip/a.jpg"),
        None,
    )
    .unwrap();
    assert_eq!(r.min, at(2021, 7, 4, 0, 0, 0));
    assert_eq!(range_from_directories(Path::new("/photos/misc/a.jpg"), None), None);
}

#[test]
fn test_directory_date_stops_at_root() {
    let image = Path::new("/backups/2019-05-01-disk/photos/misc/a.jpg");
    let r = range_from_directories(image, None).unwrap();
    assert_eq!(r.min, at(2019, 5, 1, 0, 0, 0));
    assert_eq!(
        range_from_directories(image, Some(Path::new("/backups/2019-05-01-disk/photos"))),
        None
    );
    // The root's own name still counts.
    assert!(
        range_from_directories(image, Some(Path::new("/backups/2019-05-01-disk"))).is_some()
    );
}

#[test]
fn test_exif_metadata_ignores_dates_above_root() {
    let tmp = tempfile::TempDir::new().unwrap();
    let root = tmp.path().join("2019-05-01-disk").join("photos");
    std::fs::create_dir_all(&root).unwrap();
    let image = root.join("a.jpg");
    std::fs::write(&image, b"not a jpeg").unwrap();

    assert!(ExifMetadata::default().get_metadata(&image).datetime.is_some());
    assert!(ExifMetadata::within(&root).get_metadata(&image).datetime.is_none());
}

// --- temporal distance ---

#[test]
fn test_distance_between_exact_times() {
    let a = TimeRange::exact(at(2022, 1, 3, 12, 0, 0));
    let b = TimeRange::exact(at(2022, 1, 3, 12, 0, 10));
    let d = a.distance(&b);
    assert_eq!((d.min_secs, d.max_secs), (10, 10));
    assert_eq!(b.distance(&a), d);
}

#[test]
fn test_distance_overlapping_ranges_min_zero() {
    let day = TimeRange::whole_day(NaiveDate::from_ymd_opt(2022, 1, 3).unwrap());
    let noon = TimeRange::exact(at(2022, 1, 3, 12, 0, 0));
    let d = noon.distance(&day);
    assert_eq!(d.min_secs, 0);
    assert_eq!(d.max_secs, 12 * 3600);
}

#[test]
fn test_distance_disjoint_ranges() {
    let a = TimeRange::new(at(2022, 1, 3, 10, 0, 0), at(2022, 1, 3, 9, 0, 0));
    assert_eq!(a.min, at(2022, 1, 3, 9, 0, 0));
    let b = TimeRange::new(at(2022, 1, 3, 11, 0, 0), at(2022, 1, 3, 12, 0, 0));
    let d = a.distance(&b);
    assert_eq!(d.min_secs, 3600);
    assert_eq!(d.max_secs, 3 * 3600);
}

// --- geocoding backoff ---

#[test]
fn test_backoff_retries_transient_then_recovers() {
    let backoff = Backoff::new(Duration::from_millis(1), 5);
    let calls = Cell::new(0);
    let result = backoff.run("a.jpg", || {
        calls.set(calls.get() + 1);
        if calls.get() < 3 {
            Err(GeocodeError::Transient("503".into()))
        } else {
            Ok("Paris")
        }
    });
    assert_eq!(result.unwrap(), "Paris");
    assert_eq!(calls.get(), 3);
    // 1ms doubled twice to 4ms, halved once on success
    assert_eq!(backoff.current(), Duration::from_millis(2));
}

#[test]
fn test_backoff_never_drops_below_initial() {
    let backoff = Backoff::new(Duration::from_millis(1), 5);
    for _ in 0..3 {
        assert!(backoff.run("a.jpg", || Ok::<_, GeocodeError>(())).is_ok());
    }
    assert_eq!(backoff.current(), Duration::from_millis(1));
}

#[test]
fn test_backoff_permanent_error_is_not_retried() {
    let backoff = Backoff::new(Duration::from_millis(1), 5);
    let calls = Cell::new(0);
    let result: Result<(), _> = backoff.run("a.jpg", || {
        calls.set(calls.get() + 1);
        Err(GeocodeError::Permanent("400".into()))
    });
    assert!(matches!(result, Err(GeocodeError::Permanent(_))));
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_backoff_gives_up_after_max_retries() {
    let backoff = Backoff::new(Duration::from_millis(1), 3);
    let calls = Cell::new(0);
    let result: Result<(), _> = backoff.run("a.jpg", || {
        calls.set(calls.get() + 1);
        Err(GeocodeError::Transient("timeout".into()))
    });
    assert!(matches!(result, Err(GeocodeError::Transient(_))));
    assert_eq!(calls.get(), 3);
}

// --- configuration layers ---

#[test]
fn test_file_config_overrides_only_present_keys() {
    let file = parse_file_config(
        r#"
[settings]
sort_order = "lexicographic-asc"
extensions = ["JPG", "heic"]
status_interval = 0.5
retry_failed = true

[threads]
llm = 2

[enhance]
max_context_in_prompt = 3

[backend]
url = "http://gpu-box:1234"
"#,
    )
    .unwrap();
    let mut opts = Opts::default();
    apply_file_to_opts(&file, &mut opts).unwrap();
    assert_eq!(opts.sort_order, SortOrder::LexicographicAsc);
    assert_eq!(opts.extensions, vec![".jpg", ".heic"]);
    assert_eq!(opts.status_interval, Duration::from_millis(500));
    assert!(opts.retry_failed);
    assert!(!opts.retry);
    assert_eq!(opts.threads.llm, 2);
    assert_eq!(opts.threads.write, Opts::default().threads.write);
    assert_eq!(opts.enhance.max_context_in_prompt, 3);
    assert_eq!(opts.backend_url, "http://gpu-box:1234");
    assert_eq!(opts.backend, "lmstudio");
}

#[test]
fn test_backpressure_must_be_positive_and_finite() {
    assert_eq!(check_backpressure(0.5).unwrap(), 0.5);
    for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        assert!(check_backpressure(bad).is_err(), "{bad} accepted");
    }
}

#[test]
fn test_file_config_rejects_zero_backpressure() {
    let file = parse_file_config("[settings]\nbackpressure = 0.0\n").unwrap();
    let mut opts = Opts::default();
    assert!(apply_file_to_opts(&file, &mut opts).is_err());
    assert_eq!(opts.backpressure, Opts::default().backpressure);
}

#[test]
fn test_file_config_rejects_unknown_section() {
    assert!(parse_file_config("[index]\nhash = true\n").is_err());
}

#[test]
fn test_env_layer_applies_non_empty_values() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("INPUT_DIR", "/photos"),
        ("MODEL_NAME", "llava"),
        ("SORT_ORDER", "name-asc"),
        ("STATUS_INTERVAL", "2"),
        ("BACKEND_URL", "  "),
    ]);
    let mut opts = Opts::default();
    apply_env_to_opts(&mut opts, |k| vars.get(k).map(|v| v.to_string())).unwrap();
    assert_eq!(opts.input_dir, PathBuf::from("/photos"));
    assert_eq!(opts.describe.model, "llava");
    assert_eq!(opts.sort_order, SortOrder::NaturalAsc);
    assert_eq!(opts.status_interval, Duration::from_secs(2));
    assert_eq!(opts.backend_url, Opts::default().backend_url);
}

#[test]
fn test_env_layer_rejects_bad_interval() {
    let mut opts = Opts::default();
    let r = apply_env_to_opts(&mut opts, |k| {
        (k == "STATUS_INTERVAL").then(|| "soon".to_string())
    });
    assert!(r.is_err());
}

#[test]
fn test_cli_layer_wins_and_targets_pipeline() {
    let cli = Cli::parse_from([
        "photoscribe",
        "enhance",
        "/in",
        "/out",
        "--model",
        "mistral",
        "--sort-order",
        "name-asc",
        "--llm-threads",
        "3",
        "--retry",
    ]);
    let mut opts = Opts {
        sort_order: SortOrder::LexicographicDesc,
        ..Default::default()
    };
    apply_cli_to_opts(&cli, PipelineKind::Enhance, &mut opts).unwrap();
    assert_eq!(opts.input_dir, PathBuf::from("/in"));
    assert_eq!(opts.output_dir, PathBuf::from("/out"));
    assert_eq!(opts.enhance.model, "mistral");
    assert_eq!(opts.describe.model, Opts::default().describe.model);
    assert_eq!(opts.sort_order, SortOrder::NaturalAsc);
    assert_eq!(opts.threads.llm, 3);
    assert!(opts.retry);
}

#[test]
fn test_cli_rejects_non_positive_backpressure() {
    for value in ["--backpressure=0", "--backpressure=-1", "--backpressure=NaN"] {
        let cli = Cli::parse_from(["photoscribe", "describe", value]);
        let mut opts = Opts::default();
        assert!(
            apply_cli_to_opts(&cli, PipelineKind::Describe, &mut opts).is_err(),
            "{value} accepted"
        );
    }
}

#[test]
fn test_verbosity_can_change_after_logger_install() {
    setup_logging(false);
    assert_eq!(log::max_level(), log::LevelFilter::Info);
    set_verbose(true);
    assert_eq!(log::max_level(), log::LevelFilter::Debug);
    setup_logging(false);
    assert_eq!(log::max_level(), log::LevelFilter::Info);
}

#[test]
fn test_cli_list_needs_no_pipeline() {
    let cli = Cli::parse_from(["photoscribe", "--list"]);
    assert!(cli.list);
    assert!(cli.pipeline.is_none());
    assert!(Cli::try_parse_from(["photoscribe"]).is_err());
}

#[test]
fn test_prompt_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prompt.txt");
    std::fs::write(&path, "Describe {filename}\n").unwrap();
    let arg = format!("@{}", path.display());
    assert_eq!(read_prompt(&arg).unwrap(), "Describe {filename}");
    assert_eq!(read_prompt("inline").unwrap(), "inline");
    assert!(read_prompt("@/definitely/missing/prompt.txt").is_err());
}
