use super::text::{city_name_candidate, title_case};
use super::{Throttle, insert_logged, update_logged};
use crate::audit::DiffLog;
use crate::error::Result;
use crate::fuzzy::{DEEP_START_BIAS, seek_deep_match};
use crate::geocode::{GeocodeResult, Geocoder};
use crate::model::City;
use crate::store::{Criteria, Repository};

/// Loosest bias accepted when matching city names.
pub const CITY_MIN_BIAS: f64 = 0.9;

pub struct CityResolver<'g> {
    source_text: String,
    fallback_place: String,
    force_geocode: bool,
    geocoder: &'g dyn Geocoder,
    throttle: Throttle,
    result: Option<City>,
    pub diff: DiffLog,
}

impl<'g> CityResolver<'g> {
    pub fn new(
        source_text: &str,
        fallback_place: &str,
        force_geocode: bool,
        geocoder: &'g dyn Geocoder,
        throttle: Throttle,
    ) -> Self {
        CityResolver {
            source_text: source_text.to_string(),
            fallback_place: fallback_place.trim().to_string(),
            force_geocode,
            geocoder,
            throttle,
            result: None,
            diff: DiffLog::new(),
        }
    }

    /// Find or create the city mentioned by the source text.
    ///
    /// Returns `None` only when neither text yields a name and geocoding is off
    /// or unavailable.
    pub fn resolve<R: Repository>(&mut self, store: &mut R) -> Result<Option<City>> {
        if let Some(city) = &self.result {
            return Ok(Some(city.clone()));
        }

        let candidate = city_name_candidate(&self.source_text);
        let fallback_candidate = city_name_candidate(&self.fallback_place);
        let cities: Vec<City> = store.find_many(&Criteria::new())?;
        let mut found = search(&candidate, &cities)
            .or_else(|| search(&self.fallback_place, &cities))
            .or_else(|| search(&fallback_candidate, &cities));

        let geocoded = if self.force_geocode { self.geocode() } else { None };
        if found.is_none() {
            if let Some(geo) = &geocoded {
                found = search(&geo.locality, &cities);
            }
        }

        let city = match (found, geocoded) {
            (Some(city), Some(geo)) => self.apply_geocode(store, city, &geo)?,
            (Some(city), None) => {
                tracing::debug!(city = %city.name, "city matched");
                city
            }
            (None, geo) => match self.create(store, &candidate, geo.as_ref())? {
                Some(city) => city,
                None => return Ok(None),
            },
        };

        self.result = Some(city.clone());
        Ok(Some(city))
    }

    fn geocode(&self) -> Option<GeocodeResult> {
        let address = if self.source_text.trim().is_empty() { &self.fallback_place } else { &self.source_text };
        self.geocoder.geocode(address)
    }

    fn apply_geocode<R: Repository>(&mut self, store: &mut R, city: City, geo: &GeocodeResult) -> Result<City> {
        let mut updated = city.clone();
        let mut changes = Vec::new();
        if !geo.postal_code.is_empty() {
            assign_changed!(changes, updated.zip, geo.postal_code.clone());
        }
        if !geo.admin_area2.is_empty() {
            assign_changed!(changes, updated.area, geo.admin_area2.clone());
        }
        if !geo.admin_area1.is_empty() {
            assign_changed!(changes, updated.area_type, geo.admin_area1.clone());
        }
        if !geo.country.is_empty() {
            assign_changed!(changes, updated.country, geo.country.clone());
        }
        if !geo.country_code.is_empty() {
            assign_changed!(changes, updated.country_code, geo.country_code.clone());
        }
        assign_changed!(changes, updated.latitude, Some(geo.latitude));
        assign_changed!(changes, updated.longitude, Some(geo.longitude));

        if changes.is_empty() {
            return Ok(city);
        }
        if !self.throttle.may_update(city.updated_at) {
            tracing::debug!(city = %city.name, "city update throttled");
            return Ok(city);
        }
        let action = format!("City updated: {} ({})", updated.name, changes.join(", "));
        update_logged(store, &mut updated, &changes, self.throttle.now(), &mut self.diff, action)?;
        tracing::info!(city = %updated.name, ?changes, "city updated");
        Ok(updated)
    }

    fn create<R: Repository>(
        &mut self,
        store: &mut R,
        candidate: &str,
        geo: Option<&GeocodeResult>,
    ) -> Result<Option<City>> {
        let name = match geo.map(|g| g.locality.as_str()).filter(|l| !l.is_empty()) {
            Some(locality) => locality.to_string(),
            None if !candidate.is_empty() => title_case(candidate),
            None => title_case(&city_name_candidate(&self.fallback_place)),
        };
        if name.is_empty() {
            tracing::warn!(text = %self.source_text, "no city name found");
            return Ok(None);
        }

        let or_default = |value: Option<&String>, default: &str| match value {
            Some(v) if !v.is_empty() => v.clone(),
            _ => default.to_string(),
        };
        let mut city = City {
            id: None,
            name,
            zip: or_default(geo.map(|g| &g.postal_code), "?"),
            area: or_default(geo.map(|g| &g.admin_area2), "?"),
            area_type: or_default(geo.map(|g| &g.admin_area1), ""),
            country: or_default(geo.map(|g| &g.country), "ITALIA"),
            country_code: or_default(geo.map(|g| &g.country_code), "IT"),
            latitude: geo.map(|g| g.latitude),
            longitude: geo.map(|g| g.longitude),
            updated_at: None,
        };
        let action = format!("City created: {}", city.name);
        insert_logged(store, &mut city, self.throttle.now(), &mut self.diff, action)?;
        tracing::info!(city = %city.name, geocoded = geo.is_some(), "city created");
        Ok(Some(city))
    }
}

fn search(query: &str, cities: &[City]) -> Option<City> {
    seek_deep_match(query, cities, |c| c.name.as_str(), DEEP_START_BIAS, CITY_MIN_BIAS).best().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::NoGeocoder;
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

    struct FixedGeocoder(GeocodeResult);

    impl Geocoder for FixedGeocoder {
        fn geocode(&self, _address: &str) -> Option<GeocodeResult> {
            Some(self.0.clone())
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn reggio_geocoded() -> GeocodeResult {
        GeocodeResult {
            locality: "Reggio Emilia".into(),
            postal_code: "42122".into(),
            admin_area2: "RE".into(),
            admin_area1: "Emilia-Romagna".into(),
            country: "ITALIA".into(),
            country_code: "IT".into(),
            latitude: 44.69,
            longitude: 10.63,
            ..GeocodeResult::default()
        }
    }

    fn seeded_reggio(store: &mut MemoryStore, minutes_ago: i64) -> City {
        store
            .seed(City {
                name: "Reggio Emilia".into(),
                zip: "?".into(),
                area: "?".into(),
                country: "ITALIA".into(),
                country_code: "IT".into(),
                updated_at: Some(now() - TimeDelta::minutes(minutes_ago)),
                ..City::default()
            })
            .unwrap()
    }

    #[test]
    fn creates_city_from_leading_filtered_token() {
        let mut store = MemoryStore::new();
        let mut resolver = CityResolver::new(
            "piscina comunale, via Melato, Reggio Emilia",
            "Reggio Emilia",
            false,
            &NoGeocoder,
            Throttle::new(true, 30, now()),
        );
        let city = resolver.resolve(&mut store).unwrap().unwrap();
        assert_eq!(city.name, "Reggio Emilia");
        assert_eq!((city.zip.as_str(), city.area.as_str()), ("?", "?"));
        assert_eq!((city.country.as_str(), city.country_code.as_str()), ("ITALIA", "IT"));
        assert_eq!(store.count::<City>(), 1);
        assert!(resolver.diff.has_changes());
    }

    #[test]
    fn near_spellings_reuse_the_existing_row() {
        let mut store = MemoryStore::new();
        let existing = seeded_reggio(&mut store, 60);
        let mut resolver =
            CityResolver::new("Regio Emilia", "", false, &NoGeocoder, Throttle::new(true, 30, now()));
        assert_eq!(resolver.resolve(&mut store).unwrap(), Some(existing));
        assert_eq!(store.count::<City>(), 1);
        assert!(!resolver.diff.has_changes());
    }

    #[test]
    fn fallback_place_is_searched_verbatim() {
        let mut store = MemoryStore::new();
        let existing = seeded_reggio(&mut store, 60);
        let mut resolver =
            CityResolver::new("Piscina Comunale", "Reggio Emilia", false, &NoGeocoder, Throttle::new(true, 30, now()));
        assert_eq!(resolver.resolve(&mut store).unwrap(), Some(existing));
    }

    #[test]
    fn city_named_from_the_fallback_place_is_found_again() {
        let mut store = MemoryStore::new();
        let place = "piscina comunale, via Melato, Reggio Emilia";
        let throttle = Throttle::new(true, 30, now());

        let mut first = CityResolver::new("Vasca 50 mt", place, false, &NoGeocoder, throttle);
        let created = first.resolve(&mut store).unwrap().unwrap();
        assert_eq!(created.name, "Reggio Emilia");

        let mut second = CityResolver::new("Vasca 50 mt", place, false, &NoGeocoder, throttle);
        assert_eq!(second.resolve(&mut store).unwrap(), Some(created));
        assert!(!second.diff.has_changes());
        assert_eq!(store.count::<City>(), 1);
    }

    #[test]
    fn recent_rows_are_not_overwritten_by_geocoding() {
        let geocoder = FixedGeocoder(reggio_geocoded());

        let mut store = MemoryStore::new();
        let fresh = seeded_reggio(&mut store, 10);
        let mut resolver = CityResolver::new("Reggio Emilia", "", true, &geocoder, Throttle::new(true, 30, now()));
        assert_eq!(resolver.resolve(&mut store).unwrap(), Some(fresh.clone()));
        assert_eq!(store.find_by_id::<City>(fresh.id.unwrap()).unwrap(), Some(fresh));
        assert!(!resolver.diff.has_changes());

        let mut store = MemoryStore::new();
        let stale = seeded_reggio(&mut store, 40);
        let mut resolver = CityResolver::new("Reggio Emilia", "", true, &geocoder, Throttle::new(true, 30, now()));
        let updated = resolver.resolve(&mut store).unwrap().unwrap();
        assert_eq!((updated.zip.as_str(), updated.area.as_str()), ("42122", "RE"));
        assert_eq!(updated.updated_at, Some(now()));
        let persisted: City = store.find_by_id(stale.id.unwrap()).unwrap().unwrap();
        assert_eq!(persisted.zip, "42122");
        assert!(resolver.diff.has_changes());
    }

    #[test]
    fn geocoded_locality_names_a_new_city() {
        let mut store = MemoryStore::new();
        let geocoder = FixedGeocoder(reggio_geocoded());
        let mut resolver =
            CityResolver::new("Piscina Comunale", "", true, &geocoder, Throttle::new(true, 30, now()));
        let city = resolver.resolve(&mut store).unwrap().unwrap();
        assert_eq!(city.name, "Reggio Emilia");
        assert_eq!(city.zip, "42122");
        assert_eq!(city.latitude, Some(44.69));
    }

    #[test]
    fn resolve_is_memoized() {
        let mut store = MemoryStore::new();
        let mut resolver = CityResolver::new("Parma", "", false, &NoGeocoder, Throttle::new(true, 30, now()));
        let first = resolver.resolve(&mut store).unwrap();
        let second = resolver.resolve(&mut store).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.count::<City>(), 1);
        assert_eq!(resolver.diff.change_count(), 1);
    }
}
