mod common;

use chrono::NaiveDate;
use common::{extract_settings, init_logging, item_html, machine_item_html};
use harvester_core::Engagement;
use harvester_engine::{ExtractSettings, ExtractionError, ItemSnapshot, RecordExtractor};
use pretty_assertions::assert_eq;

fn extractor() -> RecordExtractor {
    RecordExtractor::new(extract_settings())
}

#[test]
fn rendered_item_becomes_a_full_record() {
    init_logging();
    let item = ItemSnapshot::new(item_html(
        "114822",
        "Big news today.",
        "Jul 06, 2025, 08:15 PM",
    ));
    let record = extractor().extract(&item).unwrap();

    assert_eq!(record.external_id, "114822");
    assert_eq!(record.body, "Big news today.");
    assert_eq!(record.occurred_at_utc.to_rfc3339(), "2025-07-07T00:15:00+00:00");
    assert_eq!(
        record.occurred_at_local.to_rfc3339(),
        "2025-07-06T20:15:00-04:00"
    );
    assert_eq!(
        record.reporting_date(),
        NaiveDate::from_ymd_opt(2025, 7, 6).unwrap()
    );
    assert_eq!(record.engagement, Engagement::new(12_345, 1_020, 3));
    assert_eq!(
        record.canonical_url,
        "https://feed.example/@someone/posts/114822"
    );
    assert!(record.media_refs.is_empty());
}

#[test]
fn reporting_date_follows_the_reporting_timezone() {
    init_logging();
    let settings = ExtractSettings {
        reporting_timezone: chrono_tz::UTC,
        ..extract_settings()
    };
    let item = ItemSnapshot::new(item_html("1", "late post", "Jul 06, 2025, 08:15 PM"));
    let record = RecordExtractor::new(settings).extract(&item).unwrap();
    assert_eq!(
        record.reporting_date(),
        NaiveDate::from_ymd_opt(2025, 7, 7).unwrap()
    );
    assert_eq!(record.occurred_at_local, record.occurred_at_utc.fixed_offset());
}

#[test]
fn id_falls_back_to_the_post_link() {
    init_logging();
    let html = r#"<div class="status">
        <a href="https://feed.example/@someone/posts/998877?utm=x"><time datetime="2025-07-05T14:00:00Z">1d</time></a>
        <div class="status-content"><p>Linked only</p></div>
      </div>"#;
    let record = extractor().extract(&ItemSnapshot::new(html)).unwrap();
    assert_eq!(record.external_id, "998877");
    assert_eq!(record.body, "Linked only");
}

#[test]
fn missing_id_is_reported_without_an_id() {
    init_logging();
    let html = r#"<div class="status"><div class="status__content"><p>orphan</p></div></div>"#;
    let err = extractor().extract(&ItemSnapshot::new(html)).unwrap_err();
    assert_eq!(err, ExtractionError::MissingId);
    assert_eq!(err.external_id(), None);
}

#[test]
fn body_falls_back_to_item_text_without_the_header_lines() {
    init_logging();
    let html = r#"<div class="status"><div class="status__wrapper" data-id="42">
        <div>Some One</div><div>@someone</div>
        <time datetime="2025-07-05T14:00:00Z">Jul 5</time>
        <p>Line one of the post</p><p>Line two</p>
      </div></div>"#;
    let record = extractor().extract(&ItemSnapshot::new(html)).unwrap();
    assert_eq!(record.body, "Line one of the post\nLine two");
}

#[test]
fn empty_content_block_uses_the_fallback() {
    init_logging();
    let html = r#"<div class="status"><div class="status__wrapper" data-id="43">
        <div>Some One</div><div>@someone</div>
        <time datetime="2025-07-05T14:00:00Z">Jul 5</time>
        <div class="status__content">   </div>
        <p>Actual text</p>
      </div></div>"#;
    let record = extractor().extract(&ItemSnapshot::new(html)).unwrap();
    assert_eq!(record.body, "Actual text");
}

#[test]
fn header_only_item_has_no_body() {
    init_logging();
    let html = r#"<div class="status"><div class="status__wrapper" data-id="44">
        <div>Some One</div><div>@someone</div>
        <time datetime="2025-07-05T14:00:00Z">Jul 5</time>
      </div></div>"#;
    let err = extractor().extract(&ItemSnapshot::new(html)).unwrap_err();
    assert_eq!(
        err,
        ExtractionError::MissingBody {
            external_id: "44".to_string()
        }
    );
    assert_eq!(err.external_id(), Some("44"));
}

#[test]
fn unparsable_display_time_falls_back_to_machine_time() {
    init_logging();
    let html = r#"<div class="status"><div class="status__wrapper" data-id="45">
        <time title="yesterday-ish" datetime="2025-07-04T09:30:00-04:00">1d</time>
        <div class="status__content"><p>body</p></div>
      </div></div>"#;
    let record = extractor().extract(&ItemSnapshot::new(html)).unwrap();
    assert_eq!(record.occurred_at_utc.to_rfc3339(), "2025-07-04T13:30:00+00:00");
}

#[test]
fn no_parsable_time_rejects_the_item_but_keeps_its_id() {
    init_logging();
    let item = ItemSnapshot::new(item_html("46", "body", "not a time"));
    let err = extractor().extract(&item).unwrap_err();
    match &err {
        ExtractionError::UnparsableTime { external_id, .. } => assert_eq!(external_id, "46"),
        other => panic!("unexpected error {other:?}"),
    }

    let bare = r#"<div class="status"><div class="status__wrapper" data-id="47"><div class="status__content">x</div></div></div>"#;
    let err = extractor().extract(&ItemSnapshot::new(bare)).unwrap_err();
    assert_eq!(err.external_id(), Some("47"));
}

#[test]
fn only_absolute_http_media_is_kept_in_order() {
    init_logging();
    let html = r#"<div class="status"><div class="status__wrapper" data-id="48">
        <time datetime="2025-07-05T14:00:00Z">Jul 5</time>
        <div class="status__content"><p>pics</p></div>
        <img src="https://cdn.example/a.jpg">
        <img src="/relative/b.jpg">
        <img src="data:image/png;base64,AAAA">
        <video src="http://cdn.example/c.mp4"></video>
        <img>
      </div></div>"#;
    let record = extractor().extract(&ItemSnapshot::new(html)).unwrap();
    assert_eq!(
        record.media_refs,
        vec![
            "https://cdn.example/a.jpg".to_string(),
            "http://cdn.example/c.mp4".to_string()
        ]
    );
}

#[test]
fn engagement_defaults_to_zero_per_counter() {
    init_logging();
    let html = r#"<div class="status"><div class="status__wrapper" data-id="49">
        <time datetime="2025-07-05T14:00:00Z">Jul 5</time>
        <div class="status__content"><p>quiet</p></div>
        <span data-testid="like-count">7</span>
        <span data-testid="repost-count">lots</span>
      </div></div>"#;
    let record = extractor().extract(&ItemSnapshot::new(html)).unwrap();
    assert_eq!(record.engagement, Engagement::new(7, 0, 0));
}

#[test]
fn id_lookup_alone_matches_full_extraction() {
    init_logging();
    let item = ItemSnapshot::new(machine_item_html("50", "x", "2025-07-05T14:00:00Z"));
    assert_eq!(extractor().external_id(&item), Some("50".to_string()));
}
