use crate::models::{Candidate, FilterOptions, User};

/// Where the viewer lives, as far as location narrowing is concerned
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewerLocation {
    pub country: Option<String>,
    pub city: Option<String>,
}

impl ViewerLocation {
    pub fn new(country: Option<&str>, city: Option<&str>) -> Self {
        let clean = |v: Option<&str>| {
            v.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            country: clean(country),
            city: clean(city),
        }
    }
}

impl From<&User> for ViewerLocation {
    fn from(user: &User) -> Self {
        Self::new(user.residence_country.as_deref(), user.residence_city.as_deref())
    }
}

fn same_place(a: &str, b: Option<&str>) -> bool {
    b.map(|b| a.eq_ignore_ascii_case(b.trim())).unwrap_or(false)
}

/// Check if a candidate lives where the viewer lives
///
/// Without a viewer country every candidate passes. The city is only
/// compared when the viewer has one on file.
#[inline]
pub fn matches_location(candidate: &Candidate, viewer: &ViewerLocation) -> bool {
    let Some(country) = viewer.country.as_deref() else {
        return true;
    };

    if !same_place(country, candidate.residence_country.as_deref()) {
        return false;
    }

    match viewer.city.as_deref() {
        Some(city) => same_place(city, candidate.residence_city.as_deref()),
        None => true,
    }
}

/// Stage 1: keep candidates sharing the viewer's residence
///
/// Passing already-narrowed data through again is a no-op.
pub fn narrow_by_location(candidates: Vec<Candidate>, viewer: &ViewerLocation) -> Vec<Candidate> {
    if viewer.country.is_none() {
        return candidates;
    }

    candidates
        .into_iter()
        .filter(|c| matches_location(c, viewer))
        .collect()
}

/// Check a candidate against the age bounds
///
/// A set bound excludes candidates with no known age. With no bounds
/// set, everyone passes.
#[inline]
pub fn matches_age_bounds(candidate: &Candidate, options: &FilterOptions) -> bool {
    if let Some(min) = options.min_age {
        match candidate.age {
            Some(age) if age >= min => {}
            _ => return false,
        }
    }

    if let Some(max) = options.max_age {
        match candidate.age {
            Some(age) if age <= max => {}
            _ => return false,
        }
    }

    true
}

/// Stage 2: derive the displayed list from the unfiltered one
///
/// Order is preserved. An inverted range simply yields an empty list.
pub fn apply_filters(candidates: &[Candidate], options: &FilterOptions) -> Vec<Candidate> {
    if options.is_empty() {
        return candidates.to_vec();
    }

    candidates
        .iter()
        .filter(|c| matches_age_bounds(c, options))
        .cloned()
        .collect()
}
