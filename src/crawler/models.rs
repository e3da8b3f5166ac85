/// One listing as it appears in the search results, fields still raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawListing {
    pub date: Option<String>,
    pub link: String,
    pub header: String,
    pub price_text: String,
    pub address_text: String,
    pub bedrooms_text: String,
    pub sqft_text: String,
}

/// A listing with typed columns, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedListing {
    pub date: Option<String>,
    pub link: String,
    pub header: String,
    pub price: i64,
    pub address: String,
    pub bedrooms: i64,
    pub sq_foot: i64,
}

/// Listings extracted from one or more pages.
#[derive(Debug, Default)]
pub struct Extraction {
    pub listings: Vec<RawListing>,
    /// Fragments dropped because a required field was missing.
    pub skipped: usize,
}

impl Extraction {
    pub fn merge(&mut self, other: Extraction) {
        self.listings.extend(other.listings);
        self.skipped += other.skipped;
    }
}
