//! Content negotiation against the request's `Accept` header.

use crate::http::mime;
use crate::http::response::Body;

#[derive(Debug, Clone)]
struct MediaRange {
    ty: String,
    subtype: String,
    q: f32,
    order: usize,
}

fn parse_accept(header: &str) -> Vec<MediaRange> {
    header
        .split(',')
        .enumerate()
        .filter_map(|(order, item)| {
            let mut parts = item.split(';');
            let essence = parts.next()?.trim().to_ascii_lowercase();
            if essence.is_empty() {
                return None;
            }
            let (ty, subtype) = match essence.split_once('/') {
                Some((t, s)) => (t.trim().to_string(), s.trim().to_string()),
                None if essence == "*" => ("*".to_string(), "*".to_string()),
                None => return None,
            };

            let mut q = 1.0;
            for param in parts {
                if let Some((k, v)) = param.split_once('=') {
                    if k.trim().eq_ignore_ascii_case("q") {
                        q = v.trim().parse::<f32>().ok()?.clamp(0.0, 1.0);
                    }
                }
            }

            Some(MediaRange { ty, subtype, q, order })
        })
        .collect()
}

/// How specifically `range` matches `ty/subtype`, if at all.
fn specificity(range: &MediaRange, ty: &str, subtype: &str) -> Option<u8> {
    if range.ty == "*" && range.subtype == "*" {
        Some(0)
    } else if range.ty == ty && range.subtype == "*" {
        Some(1)
    } else if range.ty == ty && range.subtype == subtype {
        Some(2)
    } else {
        None
    }
}

/// Picks the offered type the client prefers.
///
/// `offered` may hold full MIME types or short names such as `"json"`. A
/// missing or empty `Accept` header accepts the first offer. Ties go to the
/// more specific range, then to the earlier range in the header, then to the
/// earlier offer.
///
/// # Example
///
/// ```
/// # use outflow::http::negotiate::best_match;
/// let accept = Some("text/html;q=0.5, application/json");
/// assert_eq!(best_match(accept, &["html", "json"]), Some("json"));
/// assert_eq!(best_match(Some("image/png"), &["html"]), None);
/// ```
pub fn best_match<'a>(accept: Option<&str>, offered: &[&'a str]) -> Option<&'a str> {
    let header = accept.map(str::trim).filter(|h| !h.is_empty());
    let Some(header) = header else {
        return offered.first().copied();
    };
    let ranges = parse_accept(header);

    let mut best: Option<(f32, u8, usize, usize)> = None;
    for (index, offer) in offered.iter().enumerate() {
        let full = mime::normalize(offer).to_ascii_lowercase();
        let essence = full.split(';').next().unwrap_or_default().trim();
        let Some((ty, subtype)) = essence.split_once('/') else {
            continue;
        };

        let matched = ranges
            .iter()
            .filter_map(|r| specificity(r, ty, subtype).map(|s| (r, s)))
            .max_by(|(a, sa), (b, sb)| sa.cmp(sb).then(a.q.total_cmp(&b.q)));
        let Some((range, rank)) = matched else {
            continue;
        };
        if range.q <= 0.0 {
            continue;
        }

        let candidate = (range.q, rank, range.order, index);
        let better = match best {
            None => true,
            Some((q, s, o, _)) => {
                candidate.0 > q
                    || (candidate.0 == q && candidate.1 > s)
                    || (candidate.0 == q && candidate.1 == s && candidate.2 < o)
            }
        };
        if better {
            best = Some(candidate);
        }
    }

    best.map(|(_, _, _, index)| offered[index])
}

type Handler = Box<dyn FnOnce() -> Body + Send>;

/// A set of per-type body producers for [`Response::format`].
///
/// [`Response::format`]: crate::http::response::Response::format
#[derive(Default)]
pub struct Format {
    handlers: Vec<(String, Handler)>,
    fallback: Option<Handler>,
}

impl Format {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a producer for a MIME type or short type name.
    pub fn on(mut self, ty: impl Into<String>, f: impl FnOnce() -> Body + Send + 'static) -> Self {
        self.handlers.push((ty.into(), Box::new(f)));
        self
    }

    /// Producer used when no registered type is acceptable.
    pub fn fallback(mut self, f: impl FnOnce() -> Body + Send + 'static) -> Self {
        self.fallback = Some(Box::new(f));
        self
    }

    pub(crate) fn types(&self) -> Vec<String> {
        self.handlers.iter().map(|(ty, _)| mime::normalize(ty)).collect()
    }

    /// Resolves the handler for `accept`: the matched type and its producer,
    /// or the fallback with no type.
    pub(crate) fn select(mut self, accept: Option<&str>) -> Option<(Option<String>, Handler)> {
        let keys: Vec<&str> = self.handlers.iter().map(|(ty, _)| ty.as_str()).collect();
        let chosen = if keys.is_empty() {
            None
        } else {
            best_match(accept, &keys).map(str::to_string)
        };

        match chosen {
            Some(key) => {
                let index = self.handlers.iter().position(|(ty, _)| *ty == key)?;
                let (ty, handler) = self.handlers.swap_remove(index);
                Some((Some(mime::normalize(&ty)), handler))
            }
            None => self.fallback.take().map(|handler| (None, handler)),
        }
    }
}
