/// Unique item identifier assigned by the vector index (stable across runs).
/// Example: `5b0d3c1e-8f0e-4c55-9a43-0f1f3bd0e2aa`
pub type ItemId = String;
/// Content-addressing key for an item's external payload.
/// Example: `https://cdn.example.com/img/1234.jpg`
pub type Locator = String;
/// Metadata field name.
/// Examples: `url`, `category`, `brand`
pub type MetaField = String;
/// Embedding vector as stored in the index.
pub type Embedding = Vec<f32>;
/// Human-readable rendering of a stratum key used in logs and coverage stats.
/// Examples: `category=shoes|brand=acme`, `cluster=3`
pub type StratumLabel = String;
