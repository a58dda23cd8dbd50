//! Swimming-pool resolution.
//!
//! The pool text is cut into words (commas kept as their own tokens) and
//! walked with ordered skip/take passes:
//!
//! ```text
//! "Piscina Comunale, via Melato 10, Reggio Emilia, vasca 25 mt"
//!  └── name ───────┘ └── address ─┘ └── trailing (city, specs) ──┘
//! ```
//!
//! Identity is the nick-name `normalize(city) + normalize(name without generic
//! words) + pool type`, capped at 40 characters.

use super::city::CityResolver;
use super::text::{is_address_word, normalize, title_case};
use super::{Throttle, insert_logged, update_logged};
use crate::audit::DiffLog;
use crate::error::Result;
use crate::fuzzy::{DEEP_MIN_BIAS, DEEP_START_BIAS, seek_deep_match};
use crate::geocode::{GeocodeResult, Geocoder};
use crate::model::{City, PoolType, SwimmingPool};
use crate::store::criteria::{in_city, of_pool_type};
use crate::store::{Criteria, Repository};

const NICK_NAME_MAX: usize = 40;

const GENERIC_POOL_WORDS: &[&str] = &[
    "piscina", "piscine", "comunale", "comunali", "impianto", "natatorio", "centro", "sportivo", "polo", "stadio",
    "del", "della", "dello", "dei", "di", "la", "il", "lo", "nuoto",
];

fn words(text: &str) -> Vec<&str> {
    regex!(r",|[^\s,]+").find_iter(text).map(|m| m.as_str()).collect()
}

fn is_spec_word(word: &str) -> bool {
    word.starts_with(|c: char| c.is_ascii_digit()) || regex!(r"(?i)^(?:vasca|corsie|mt\.?|metri)$").is_match(word)
}

fn name_part(words: &[&str]) -> String {
    words
        .iter()
        .skip_while(|w| **w == ",")
        .take_while(|w| **w != "," && !is_address_word(w) && !is_spec_word(w))
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

fn address_part(words: &[&str]) -> String {
    words.iter().skip_while(|w| !is_address_word(w)).take_while(|w| **w != ",").copied().collect::<Vec<_>>().join(" ")
}

/// Pool length stated in the text, if any.
pub fn parse_pool_type(text: &str) -> Option<PoolType> {
    let caps = regex!(r"(?i)(?:\bvasca\s*(?:da\s*)?|\b)(25|50)\s*(?:m\b|mt\b|metri\b|m\.)")
        .captures(text)
        .or_else(|| regex!(r"(?i)\bvasca\s*(?:da\s*)?(25|50)\b").captures(text))?;
    PoolType::from_code(&caps[1])
}

fn parse_lanes(text: &str) -> Option<u32> {
    regex!(r"(?i)\b(\d{1,2})\s*corsie\b").captures(text).and_then(|caps| caps[1].parse().ok())
}

fn stripped_name(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .map(normalize)
        .filter(|w| !w.is_empty() && !GENERIC_POOL_WORDS.contains(&w.as_str()))
        .collect()
}

pub fn nick_name(city_name: &str, pool_name: &str, pool_type: PoolType) -> String {
    let code = pool_type.code();
    let mut base = normalize(city_name) + &stripped_name(pool_name);
    base.truncate(NICK_NAME_MAX - code.len());
    base + code
}

pub struct PoolResolver<'g> {
    pool_text: String,
    fallback_place: String,
    default_pool_type: PoolType,
    force_geocode: bool,
    geocoder: &'g dyn Geocoder,
    throttle: Throttle,
    result: Option<SwimmingPool>,
    pub diff: DiffLog,
}

impl<'g> PoolResolver<'g> {
    pub fn new(
        pool_text: &str,
        fallback_place: &str,
        default_pool_type: PoolType,
        force_geocode: bool,
        geocoder: &'g dyn Geocoder,
        throttle: Throttle,
    ) -> Self {
        PoolResolver {
            pool_text: pool_text.trim().to_string(),
            fallback_place: fallback_place.trim().to_string(),
            default_pool_type,
            force_geocode,
            geocoder,
            throttle,
            result: None,
            diff: DiffLog::new(),
        }
    }

    /// Find or create the pool described by the text, linked to its city.
    /// Returns `None` when no city can be resolved.
    pub fn resolve<R: Repository>(&mut self, store: &mut R) -> Result<Option<SwimmingPool>> {
        if let Some(pool) = &self.result {
            return Ok(Some(pool.clone()));
        }

        let mut city_resolver =
            CityResolver::new(&self.pool_text, &self.fallback_place, self.force_geocode, self.geocoder, self.throttle);
        let city = city_resolver.resolve(store);
        self.diff.append(&city_resolver.diff);
        let Some(city) = city? else {
            return Ok(None);
        };
        let Some(city_id) = city.id else {
            return Ok(None);
        };

        let tokens = words(&self.pool_text);
        let mut name = title_case(&name_part(&tokens));
        if name.is_empty() || normalize(&name) == normalize(&city.name) {
            name = "Piscina Comunale".to_string();
        }
        let address = address_part(&tokens);
        let parsed_type = parse_pool_type(&self.pool_text);
        let pool_type = parsed_type.unwrap_or(self.default_pool_type);

        let mut found = search(store, &city, &name, pool_type)?;
        if found.is_none() && parsed_type.is_none() {
            found = search(store, &city, &name, pool_type.alternate())?;
        }
        if found.is_none() {
            found = store.find_one::<SwimmingPool>(&of_pool_type(in_city(city_id), pool_type.code()))?;
            if let Some(pool) = &found {
                tracing::debug!(pool = %pool.nick_name, "pool fallback: first of type in city");
            }
        }

        let pool = match found {
            Some(pool) => self.update(store, pool, city_id, &address)?,
            None => self.create(store, &city, name, address, pool_type)?,
        };
        self.result = Some(pool.clone());
        Ok(Some(pool))
    }

    fn geocode(&self, address: &str, city: &str) -> Option<GeocodeResult> {
        if !self.force_geocode {
            return None;
        }
        self.geocoder.geocode(&format!("{address}, {city}"))
    }

    fn update<R: Repository>(
        &mut self,
        store: &mut R,
        pool: SwimmingPool,
        city_id: i64,
        address: &str,
    ) -> Result<SwimmingPool> {
        if pool.read_only {
            tracing::debug!(pool = %pool.nick_name, "pool is read-only");
            return Ok(pool);
        }

        let mut updated = pool.clone();
        let mut changes = Vec::new();
        if !address.is_empty() {
            assign_changed!(changes, updated.address, address.to_string());
        }
        if let Some(lanes) = parse_lanes(&self.pool_text) {
            assign_changed!(changes, updated.lanes, Some(lanes));
        }
        assign_changed!(changes, updated.city_id, Some(city_id));
        if let Some(geo) = self.geocode(&updated.address, &self.fallback_place) {
            assign_changed!(changes, updated.maps_uri, geo.maps_uri());
            assign_changed!(changes, updated.latitude, Some(geo.latitude));
            assign_changed!(changes, updated.longitude, Some(geo.longitude));
        }

        if changes.is_empty() {
            return Ok(pool);
        }
        if !self.throttle.may_update(pool.updated_at) {
            tracing::debug!(pool = %pool.nick_name, "pool update throttled");
            return Ok(pool);
        }
        let action = format!("Pool updated: {} ({})", updated.nick_name, changes.join(", "));
        update_logged(store, &mut updated, &changes, self.throttle.now(), &mut self.diff, action)?;
        tracing::info!(pool = %updated.nick_name, ?changes, "pool updated");
        Ok(updated)
    }

    fn create<R: Repository>(
        &mut self,
        store: &mut R,
        city: &City,
        name: String,
        address: String,
        pool_type: PoolType,
    ) -> Result<SwimmingPool> {
        let geo = self.geocode(&address, &city.name);
        let mut pool = SwimmingPool {
            nick_name: nick_name(&city.name, &name, pool_type),
            name,
            pool_type,
            lanes: parse_lanes(&self.pool_text),
            address,
            city_id: city.id,
            maps_uri: geo.as_ref().map(GeocodeResult::maps_uri).unwrap_or_default(),
            latitude: geo.as_ref().map(|g| g.latitude),
            longitude: geo.as_ref().map(|g| g.longitude),
            ..SwimmingPool::default()
        };
        let action = format!("Pool created: {} ({})", pool.name, pool.nick_name);
        insert_logged(store, &mut pool, self.throttle.now(), &mut self.diff, action)?;
        tracing::info!(pool = %pool.nick_name, city = %city.name, "pool created");
        Ok(pool)
    }
}

/// Nick-name lookup, then fuzzy comparison of stripped nick-names among the
/// city's pools of the same type.
fn search<R: Repository>(
    store: &R,
    city: &City,
    name: &str,
    pool_type: PoolType,
) -> Result<Option<SwimmingPool>> {
    let nick = nick_name(&city.name, name, pool_type);
    let by_nick = of_pool_type(Criteria::new().eq("nick_name", nick.as_str()), pool_type.code());
    if let Some(pool) = store.find_one::<SwimmingPool>(&by_nick)? {
        tracing::debug!(pool = %pool.nick_name, "pool matched by nick-name");
        return Ok(Some(pool));
    }

    let Some(city_id) = city.id else {
        return Ok(None);
    };
    let query = stripped_name(name);
    let city_prefix = normalize(&city.name);
    let candidates: Vec<(String, SwimmingPool)> = store
        .find_many::<SwimmingPool>(&of_pool_type(in_city(city_id), pool_type.code()))?
        .into_iter()
        .map(|pool| {
            let nick = pool.nick_name.strip_prefix(city_prefix.as_str()).unwrap_or(&pool.nick_name);
            let nick = nick.strip_suffix(pool_type.code()).unwrap_or(nick).to_string();
            (nick, pool)
        })
        .collect();

    let found = seek_deep_match(&query, &candidates, |c| c.0.as_str(), DEEP_START_BIAS, DEEP_MIN_BIAS)
        .best()
        .map(|(_, pool)| pool.clone());
    if let Some(pool) = &found {
        tracing::debug!(pool = %pool.nick_name, "pool matched by fuzzy nick-name");
    }
    Ok(found)
}
