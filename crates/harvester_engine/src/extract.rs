use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use harvester_core::{
    canonical_url, first_success, is_absolute_http_url, Engagement, FeedRecord, LookupChain,
};
use scraper::{ElementRef, Html, Selector};

use crate::settings::ExtractSettings;
use crate::text::{visible_lines, visible_text};
use crate::{ExtractionError, ItemSnapshot};

struct Selectors {
    wrapper_id: Option<Selector>,
    post_link: Option<Selector>,
    body: Option<Selector>,
    display_time: Option<Selector>,
    machine_time: Option<Selector>,
    likes: Option<Selector>,
    reposts: Option<Selector>,
    comments: Option<Selector>,
    media: Option<Selector>,
}

impl Selectors {
    fn new() -> Self {
        Self {
            wrapper_id: Selector::parse(".status__wrapper[data-id]").ok(),
            post_link: Selector::parse("a[href*='/posts/']").ok(),
            body: Selector::parse(".status-content, .status__content").ok(),
            display_time: Selector::parse("time[title]").ok(),
            machine_time: Selector::parse("time[datetime]").ok(),
            likes: Selector::parse("[data-testid='like-count']").ok(),
            reposts: Selector::parse("[data-testid='repost-count']").ok(),
            comments: Selector::parse("[data-testid='comment-count']").ok(),
            media: Selector::parse("img, video").ok(),
        }
    }
}

enum TimeSource<'a> {
    Display(&'a str),
    Machine(&'a str),
}

/// Turns captured feed-item markup into [`FeedRecord`]s.
pub struct RecordExtractor {
    settings: ExtractSettings,
    selectors: Selectors,
}

impl RecordExtractor {
    pub fn new(settings: ExtractSettings) -> Self {
        Self {
            settings,
            selectors: Selectors::new(),
        }
    }

    /// Only the id; cheaper than a full extraction for already-decided items.
    pub fn external_id(&self, item: &ItemSnapshot) -> Option<String> {
        let fragment = Html::parse_fragment(&item.outer_html);
        self.resolve_id(&fragment)
    }

    pub fn extract(&self, item: &ItemSnapshot) -> Result<FeedRecord, ExtractionError> {
        let fragment = Html::parse_fragment(&item.outer_html);
        let external_id = self
            .resolve_id(&fragment)
            .ok_or(ExtractionError::MissingId)?;

        let body = self
            .resolve_body(&fragment)
            .ok_or_else(|| ExtractionError::MissingBody {
                external_id: external_id.clone(),
            })?;

        let occurred_at_utc =
            self.resolve_time(&fragment)
                .map_err(|detail| ExtractionError::UnparsableTime {
                    external_id: external_id.clone(),
                    detail,
                })?;
        let occurred_at_local = occurred_at_utc
            .with_timezone(&self.settings.reporting_timezone)
            .fixed_offset();

        let engagement = Engagement::new(
            count_at(&fragment, &self.selectors.likes),
            count_at(&fragment, &self.selectors.reposts),
            count_at(&fragment, &self.selectors.comments),
        );

        let media_refs = self.resolve_media(&fragment);
        let canonical_url = canonical_url(&self.settings.profile_url, &external_id);

        Ok(FeedRecord {
            external_id,
            body,
            occurred_at_local,
            occurred_at_utc,
            engagement,
            media_refs,
            canonical_url,
        })
    }

    fn resolve_id(&self, fragment: &Html) -> Option<String> {
        let chain = LookupChain::new()
            .then("wrapper data-id", |doc: &Html| {
                first_element(doc, &self.selectors.wrapper_id)
                    .and_then(|el| el.value().attr("data-id"))
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
            })
            .then("post link", |doc: &Html| {
                first_element(doc, &self.selectors.post_link)
                    .and_then(|el| el.value().attr("href"))
                    .and_then(id_from_post_href)
            });
        let resolved = chain.resolve(fragment)?;
        engine_logging::engine_trace!(
            "item id {} resolved via {}",
            resolved.value,
            resolved.strategy
        );
        Some(resolved.value)
    }

    fn resolve_body(&self, fragment: &Html) -> Option<String> {
        let skip = self.settings.boilerplate_lines;
        let chain = LookupChain::new()
            .then("content block", |doc: &Html| {
                first_element(doc, &self.selectors.body)
                    .map(visible_text)
                    .filter(|text| !text.is_empty())
            })
            .then("item text", move |doc: &Html| {
                let lines = visible_lines(doc.root_element());
                if lines.len() <= skip {
                    return None;
                }
                Some(lines[skip..].join("\n"))
            });
        chain.resolve(fragment).map(|resolved| resolved.value)
    }

    fn resolve_time(&self, fragment: &Html) -> Result<DateTime<Utc>, String> {
        let mut candidates = Vec::new();
        if let Some(title) = first_element(fragment, &self.selectors.display_time)
            .and_then(|el| el.value().attr("title"))
        {
            candidates.push(TimeSource::Display(title));
        }
        if let Some(stamp) = first_element(fragment, &self.selectors.machine_time)
            .and_then(|el| el.value().attr("datetime"))
        {
            candidates.push(TimeSource::Machine(stamp));
        }
        if candidates.is_empty() {
            return Err("no time element".to_string());
        }

        first_success(candidates, |source| match source {
            TimeSource::Display(raw) => parse_display_time(
                raw,
                &self.settings.display_time_format,
                self.settings.source_timezone,
            ),
            TimeSource::Machine(raw) => DateTime::parse_from_rfc3339(raw.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|err| format!("datetime {raw:?}: {err}")),
        })
        .map_err(|failures| failures.join("; "))
    }

    fn resolve_media(&self, fragment: &Html) -> Vec<String> {
        let Some(sel) = self.selectors.media.as_ref() else {
            return Vec::new();
        };
        fragment
            .select(sel)
            .filter_map(|el| el.value().attr("src"))
            .map(str::trim)
            .filter(|src| is_absolute_http_url(src))
            .map(str::to_string)
            .collect()
    }
}

fn first_element<'a>(doc: &'a Html, sel: &Option<Selector>) -> Option<ElementRef<'a>> {
    sel.as_ref().and_then(|sel| doc.select(sel).next())
}

fn id_from_post_href(href: &str) -> Option<String> {
    let (_, tail) = href.split_once("/posts/")?;
    let id = tail.split(['?', '#', '/']).next().unwrap_or_default().trim();
    (!id.is_empty()).then(|| id.to_string())
}

/// Parse a wall-clock display time in `zone`. Ambiguous times (DST fall-back)
/// resolve to the earlier instant; skipped times (spring-forward) fail.
pub fn parse_display_time(raw: &str, format: &str, zone: Tz) -> Result<DateTime<Utc>, String> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), format)
        .map_err(|err| format!("title {raw:?}: {err}"))?;
    zone.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| format!("title {raw:?}: local time does not exist in {zone}"))
}

/// Counter text such as `1,204`; anything unparsable counts as zero.
fn count_at(fragment: &Html, sel: &Option<Selector>) -> u64 {
    first_element(fragment, sel)
        .map(|el| el.text().collect::<String>())
        .map(|text| parse_count(&text))
        .unwrap_or(0)
}

fn parse_count(text: &str) -> u64 {
    let digits: String = text
        .chars()
        .filter(|ch| *ch != ',' && !ch.is_whitespace())
        .collect();
    digits.parse().unwrap_or(0)
}
