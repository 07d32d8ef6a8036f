//! Popups and the dispatch table that lets engine-rendered popup buttons call
//! back into the application.
//!
//! Popup content lives outside any component tree, so its buttons carry a
//! control id instead of a closure. Pressing one is resolved through the
//! [`DispatchTable`], which only ever holds the entries of the one active
//! popup.

use std::fmt::Write as _;
use std::rc::Rc;

use foundation::arena::Arena;
use foundation::bounds::LngLat;
use foundation::handles::Handle;
use foundation::time::{Deadline, Time};
use records::{BusinessRecord, RecordId, ScoreTier, SeoMetrics};
use serde::Serialize;
use tracing::debug;

use crate::config::PopupConfig;
use crate::engine::{MapEngine, PopupId};
use crate::error::MapError;
use crate::surface::MapSurface;

/// Called with the record the user picked.
pub type SelectHandler = Rc<dyn Fn(&BusinessRecord)>;
/// Called with the record the user wants to compare.
pub type CompareHandler = Rc<dyn Fn(&BusinessRecord)>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PopupActionKind {
    Inspect,
    Compare,
}

impl PopupActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PopupActionKind::Inspect => "inspect",
            PopupActionKind::Compare => "compare",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopupAction {
    pub kind: PopupActionKind,
    pub label: String,
    /// Dispatch control id, packed for embedding in markup.
    pub control: u64,
}

/// Self-contained popup body: display fields plus action controls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopupContent {
    pub record_id: RecordId,
    pub title: String,
    pub sector: String,
    pub city: String,
    pub address: String,
    pub score: f64,
    pub tier: ScoreTier,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub seo: Option<SeoMetrics>,
    pub potential: Option<String>,
    pub actions: Vec<PopupAction>,
}

impl PopupContent {
    /// Content without actions; controls are attached when the popup opens.
    pub fn for_record(record: &BusinessRecord) -> Self {
        Self {
            record_id: record.id.clone(),
            title: record.name.clone(),
            sector: record.sector.clone(),
            city: record.city.clone(),
            address: record.address.clone(),
            score: record.score,
            tier: ScoreTier::from_score(record.score),
            rating: record.rating,
            review_count: record.review_count,
            phone: record.phone.clone(),
            website: record.website.clone(),
            seo: record.seo.clone(),
            potential: record.potential.clone(),
            actions: Vec::new(),
        }
    }

    pub fn action(&self, kind: PopupActionKind) -> Option<&PopupAction> {
        self.actions.iter().find(|a| a.kind == kind)
    }

    /// Markup for engines that render popups as HTML. All record text is
    /// escaped.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "<div class=\"biz-popup tier-{}\" data-record=\"{}\">",
            self.tier.as_str(),
            escape(&self.record_id)
        );
        let _ = write!(out, "<h3>{}</h3>", escape(&self.title));
        let _ = write!(
            out,
            "<div class=\"biz-score\">{:.0}<span>/100</span></div>",
            self.score
        );
        if !self.sector.is_empty() || !self.city.is_empty() {
            let _ = write!(
                out,
                "<p class=\"biz-meta\">{} · {}</p>",
                escape(&self.sector),
                escape(&self.city)
            );
        }
        if !self.address.is_empty() {
            let _ = write!(out, "<p class=\"biz-address\">{}</p>", escape(&self.address));
        }
        if let Some(rating) = self.rating {
            let _ = write!(
                out,
                "<p class=\"biz-rating\">{} {:.1}",
                stars(rating),
                rating
            );
            if let Some(n) = self.review_count {
                let _ = write!(out, " ({n})");
            }
            out.push_str("</p>");
        }
        if let Some(phone) = &self.phone {
            let _ = write!(out, "<p class=\"biz-phone\">{}</p>", escape(phone));
        }
        if let Some(site) = &self.website {
            let _ = write!(
                out,
                "<p class=\"biz-website\"><a href=\"{0}\" target=\"_blank\" rel=\"noopener\">{0}</a></p>",
                escape(site)
            );
        }
        if let Some(seo) = &self.seo {
            out.push_str("<ul class=\"biz-seo\">");
            for (label, value) in [
                ("Backlinks", seo.backlinks),
                ("Keywords", seo.indexed_keywords),
                ("Traffic", seo.organic_traffic),
            ] {
                if let Some(v) = value {
                    let _ = write!(out, "<li>{label}: {v}</li>");
                }
            }
            out.push_str("</ul>");
        }
        if let Some(p) = &self.potential {
            let _ = write!(out, "<span class=\"biz-potential\">{}</span>", escape(p));
        }
        if !self.actions.is_empty() {
            out.push_str("<div class=\"biz-actions\">");
            for a in &self.actions {
                let _ = write!(
                    out,
                    "<button data-action=\"{}\" data-control=\"{}\" data-record=\"{}\">{}</button>",
                    a.kind.as_str(),
                    a.control,
                    escape(&self.record_id),
                    escape(&a.label)
                );
            }
            out.push_str("</div>");
        }
        out.push_str("</div>");
        out
    }
}

fn stars(rating: f64) -> String {
    let full = rating.clamp(0.0, 5.0).round() as usize;
    let mut s = "★".repeat(full);
    s.push_str(&"☆".repeat(5 - full));
    s
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

struct DispatchEntry {
    record: BusinessRecord,
    kind: PopupActionKind,
    handler: Rc<dyn Fn(&BusinessRecord)>,
}

/// Id-keyed callbacks for popup controls.
///
/// Backed by a generational arena: a control id from a closed popup can never
/// resolve to an entry installed later, even if the slot is reused.
#[derive(Default)]
pub struct DispatchTable {
    entries: Arena<DispatchEntry>,
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn register(
        &mut self,
        record: &BusinessRecord,
        kind: PopupActionKind,
        handler: Rc<dyn Fn(&BusinessRecord)>,
    ) -> Handle {
        self.entries.insert(DispatchEntry {
            record: record.clone(),
            kind,
            handler,
        })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivePopup {
    pub popup: PopupId,
    pub record_id: RecordId,
    pub position: LngLat,
    pub controls: Vec<Handle>,
    pub deadline: Deadline,
}

/// Result of pressing a popup control.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Invoked {
        kind: PopupActionKind,
        record: BusinessRecord,
    },
    /// The control belongs to a popup that is gone, or to another record.
    Stale,
}

/// Owns the single active popup and its dispatch entries.
#[derive(Debug)]
pub struct PopupController {
    config: PopupConfig,
    active: Option<ActivePopup>,
    dispatch: DispatchTable,
}

impl PopupController {
    pub fn new(config: PopupConfig) -> Self {
        Self {
            config,
            active: None,
            dispatch: DispatchTable::new(),
        }
    }

    pub fn active(&self) -> Option<&ActivePopup> {
        self.active.as_ref()
    }

    pub fn active_record_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.record_id.as_str())
    }

    pub fn dispatch_len(&self) -> usize {
        self.dispatch.len()
    }

    /// Builds content for `record` and opens it at `at`.
    pub fn show<E: MapEngine>(
        &mut self,
        surface: &mut MapSurface<E>,
        record: &BusinessRecord,
        at: LngLat,
        on_select: SelectHandler,
        on_compare: CompareHandler,
        now: Time,
    ) -> Result<PopupId, MapError> {
        self.open(
            surface,
            record,
            PopupContent::for_record(record),
            at,
            on_select,
            on_compare,
            now,
        )
    }

    /// Opens prepared content. Any open popup is closed first, so its
    /// dispatch entries are gone before the new ones are installed.
    #[allow(clippy::too_many_arguments)]
    pub fn open<E: MapEngine>(
        &mut self,
        surface: &mut MapSurface<E>,
        record: &BusinessRecord,
        mut content: PopupContent,
        at: LngLat,
        on_select: SelectHandler,
        on_compare: CompareHandler,
        now: Time,
    ) -> Result<PopupId, MapError> {
        surface.engine()?;
        self.close(surface);

        let inspect = self
            .dispatch
            .register(record, PopupActionKind::Inspect, on_select);
        let compare = self
            .dispatch
            .register(record, PopupActionKind::Compare, on_compare);
        content.actions = vec![
            PopupAction {
                kind: PopupActionKind::Inspect,
                label: "Inspect".to_string(),
                control: inspect.to_bits(),
            },
            PopupAction {
                kind: PopupActionKind::Compare,
                label: "Compare".to_string(),
                control: compare.to_bits(),
            },
        ];

        let popup = surface
            .engine_mut()?
            .open_popup(at, &content, self.config.max_width_px);
        debug!(popup, record = %record.id, "popup opened");
        self.active = Some(ActivePopup {
            popup,
            record_id: record.id.clone(),
            position: at,
            controls: vec![inspect, compare],
            deadline: Deadline::in_secs(now, self.config.auto_dismiss_secs),
        });
        Ok(popup)
    }

    /// Force-closes the active popup. Returns `true` if one was open.
    pub fn close<E: MapEngine>(&mut self, surface: &mut MapSurface<E>) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        if let Ok(engine) = surface.engine_mut() {
            engine.close_popup(active.popup);
        }
        self.dispatch.clear();
        debug!(popup = active.popup, record = %active.record_id, "popup closed");
        true
    }

    /// Closes the popup if it shows `record_id`.
    pub fn close_if_record<E: MapEngine>(
        &mut self,
        surface: &mut MapSurface<E>,
        record_id: &str,
    ) -> bool {
        if self.active_record_id() == Some(record_id) {
            return self.close(surface);
        }
        false
    }

    /// The user closed `popup` from the engine side.
    pub fn on_popup_closed(&mut self, popup: PopupId) -> bool {
        match &self.active {
            Some(active) if active.popup == popup => {
                self.active = None;
                self.dispatch.clear();
                true
            }
            _ => false,
        }
    }

    /// Closes the popup once its auto-dismiss deadline has passed. Returns
    /// `true` if it did.
    pub fn tick<E: MapEngine>(&mut self, surface: &mut MapSurface<E>, now: Time) -> bool {
        let expired = self
            .active
            .as_ref()
            .is_some_and(|a| a.deadline.is_expired(now));
        if expired {
            debug!("popup auto-dismissed");
            return self.close(surface);
        }
        false
    }

    /// Resolves a pressed control. Runs the handler only when the control is
    /// live and the record id matches the active popup's record.
    pub fn dispatch(&mut self, control: u64, record_id: &str) -> DispatchOutcome {
        if self.active_record_id() != Some(record_id) {
            debug!(record = record_id, "ignoring control from a replaced popup");
            return DispatchOutcome::Stale;
        }
        let handle = Handle::from_bits(control);
        let Some(entry) = self.dispatch.entries.get(handle) else {
            return DispatchOutcome::Stale;
        };
        if entry.record.id != record_id {
            return DispatchOutcome::Stale;
        }
        let handler = entry.handler.clone();
        let record = entry.record.clone();
        let kind = entry.kind;
        handler(&record);
        DispatchOutcome::Invoked { kind, record }
    }
}
