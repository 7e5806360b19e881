use anyhow::anyhow;
use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::tools::display_relative;
use crate::geocode::{Backoff, Geocoder};
use crate::metadata::MetadataSource;
use crate::task::{Outcome, Stage};
use crate::types::WriteItem;
use crate::utils::config::GeocodeDefaults;

/// GPS position to address. Images without a position (or with no address there) get `N/A`.
pub struct GeolocateStage {
    source: Arc<dyn MetadataSource>,
    geocoder: Arc<dyn Geocoder>,
    backoff: Backoff,
    input_root: PathBuf,
}

impl GeolocateStage {
    pub fn new(
        source: Arc<dyn MetadataSource>,
        geocoder: Arc<dyn Geocoder>,
        backoff: Backoff,
        input_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            geocoder,
            backoff,
            input_root: input_root.into(),
        }
    }
}

impl Stage for GeolocateStage {
    type Input = PathBuf;
    type Output = WriteItem;

    fn execute(&self, image: &PathBuf) -> Outcome<WriteItem, PathBuf> {
        let meta = self.source.get_metadata(image);
        let Some((lat, lon)) = meta.gps else {
            return Outcome::one(WriteItem::success(
                image.clone(),
                GeocodeDefaults::NO_LOCATION.to_string(),
                Some(meta),
            ));
        };
        let label = display_relative(image, Some(&self.input_root));
        match self
            .backoff
            .run(&label, || self.geocoder.reverse_geocode(lat, lon))
        {
            Ok(address) => Outcome::one(WriteItem::success(
                image.clone(),
                address.unwrap_or_else(|| GeocodeDefaults::NO_LOCATION.to_string()),
                Some(meta),
            )),
            Err(e) => Outcome::Failed(anyhow!("Geolocation failed for {label}: {e}")),
        }
    }
}
