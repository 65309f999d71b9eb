//! Listing display names.
//!
//! Before a listing is unlocked its company name is hidden behind a label
//! built from its location, e.g. `경기 용인시 처인구 창고`.

use crate::types::{ItemType, Listing, ListingProfile};

/// Resolve the name to show for a listing.
///
/// Privileged actors and users holding a view record see the real company
/// name. Everyone else sees [`masked_name`]. A listing with no company name
/// on file falls back to the masked label either way.
#[must_use]
pub fn resolve_name(listing: &Listing, actor_is_privileged: bool, has_view_record: bool) -> String {
    let profile = listing.profile();

    if (actor_is_privileged || has_view_record)
        && let Some(name) = non_empty(profile.company_name.as_deref())
    {
        return name.to_owned();
    }

    masked_name(profile, listing.item_type())
}

/// Location-derived placeholder label.
///
/// Uses the most specific of `{region} {city} {dong} {type}`,
/// `{region} 지역 {type}` and `{type}` whose fields are all present.
#[must_use]
pub fn masked_name(profile: &ListingProfile, item_type: ItemType) -> String {
    let label = item_type.label();
    let location = non_empty(profile.location.as_deref());
    let city = non_empty(profile.city.as_deref());
    let dong = non_empty(profile.dong.as_deref());

    match (location, city, dong) {
        (Some(location), Some(city), Some(dong)) => format!("{location} {city} {dong} {label}"),
        (Some(location), _, _) => format!("{location} 지역 {label}"),
        _ => label.to_owned(),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
