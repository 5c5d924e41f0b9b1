mod clock;
mod listing;

pub use clock::{Clock, SystemClock};
pub use listing::{LISTING_API, LISTING_FIELDS, ListingCache};
