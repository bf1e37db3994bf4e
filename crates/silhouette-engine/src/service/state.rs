use std::sync::Arc;

use crate::studio::Studio;

pub struct ServiceState {
    studio: Arc<Studio>,
}

impl ServiceState {
    pub fn new(studio: Arc<Studio>) -> Self {
        Self { studio }
    }

    pub fn studio(&self) -> &Studio {
        &self.studio
    }
}
