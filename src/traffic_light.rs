//! Traffic lights.
//!
//! A traffic light binds a logical flow name to a pulse, or to nothing, which
//! means always green. Missing configuration never denies a caller: waiting on an
//! unknown name returns at once.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::config::DEFAULT_TRAFFIC_LIGHT;
use crate::error_handling::AttenuatorError;
use crate::pulse::Pulse;

/// A named binding to at most one pulse.
#[derive(Clone)]
pub struct TrafficLight {
    name: String,
    pulse: Option<Arc<dyn Pulse>>,
}

impl TrafficLight {
    /// Creates a light bound to `pulse`; `None` is always green.
    pub fn new(name: impl Into<String>, pulse: Option<Arc<dyn Pulse>>) -> Self {
        TrafficLight {
            name: name.into(),
            pulse,
        }
    }

    /// Name of the flow.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if this light never makes anyone wait.
    pub fn is_always_green(&self) -> bool {
        self.pulse.is_none()
    }

    /// Waits for the bound pulse. `attempt` is only logged.
    pub async fn wait_for_green(&self, attempt: u32) -> Result<(), AttenuatorError> {
        match &self.pulse {
            None => Ok(()),
            Some(pulse) => {
                log::debug!("Waiting for {} (attempt {})", self.name, attempt);
                pulse.wait_for_next().await
            }
        }
    }
}

impl fmt::Debug for TrafficLight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrafficLight")
            .field("name", &self.name)
            .field("pulse", &self.pulse.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

/// Owned name → traffic light map, case-insensitive.
///
/// Starts with the default light (empty name, always green).
pub struct TrafficLightRegistry {
    lights: RwLock<HashMap<String, TrafficLight>>,
}

impl TrafficLightRegistry {
    /// Creates a registry holding only the default light.
    pub fn new() -> Self {
        let registry = TrafficLightRegistry {
            lights: RwLock::new(HashMap::new()),
        };
        registry.register(TrafficLight::new(DEFAULT_TRAFFIC_LIGHT, None));
        registry
    }

    /// Inserts or replaces the light with the same (case-insensitive) name.
    pub fn register(&self, light: TrafficLight) {
        let key = light.name.to_lowercase();
        let mut lights = self.lights.write().unwrap_or_else(|e| e.into_inner());
        lights.insert(key, light);
    }

    /// Looks a light up by name.
    pub fn get(&self, name: &str) -> Option<TrafficLight> {
        let lights = self.lights.read().unwrap_or_else(|e| e.into_inner());
        lights.get(&name.to_lowercase()).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let lights = self.lights.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = lights.values().map(|l| l.name.clone()).collect();
        names.sort();
        names
    }

    /// Waits for green on the named light.
    ///
    /// An unregistered name, or a light without a pulse, returns immediately.
    /// The lock is released before waiting.
    pub async fn wait_for_green(&self, name: &str, attempt: u32) -> Result<(), AttenuatorError> {
        match self.get(name) {
            Some(light) => light.wait_for_green(attempt).await,
            None => {
                log::debug!("No traffic light '{}', not throttling (attempt {})", name, attempt);
                Ok(())
            }
        }
    }
}

impl Default for TrafficLightRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::PulseRegistry;
    use std::time::{Duration, Instant};
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_unknown_name_is_green() {
        let registry = TrafficLightRegistry::new();
        let start = Instant::now();
        registry.wait_for_green("nobody", 1).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_default_light_is_registered_and_green() {
        let registry = TrafficLightRegistry::new();
        let light = registry.get(DEFAULT_TRAFFIC_LIGHT).unwrap();
        assert!(light.is_always_green());
        registry.wait_for_green("", 3).await.unwrap();
    }

    #[tokio::test]
    async fn test_light_delegates_to_pulse() {
        let pulses = PulseRegistry::default();
        let pulse = pulses.create_local("slow", 1, 1.0).unwrap();
        let lights = TrafficLightRegistry::new();
        lights.register(TrafficLight::new("Search", Some(pulse)));

        // 1Hz: nothing within 100ms
        let early = timeout(Duration::from_millis(100), lights.wait_for_green("search", 1)).await;
        assert!(early.is_err());

        let later = timeout(Duration::from_millis(2000), lights.wait_for_green("SEARCH", 2)).await;
        assert!(matches!(later, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_register_is_idempotent_upsert() {
        let pulses = PulseRegistry::default();
        let pulse = pulses.create_local("p", 1, 1.0).unwrap();
        let lights = TrafficLightRegistry::new();

        lights.register(TrafficLight::new("flow", Some(pulse)));
        lights.register(TrafficLight::new("FLOW", None));

        assert_eq!(lights.names().len(), 2);
        assert!(lights.get("flow").unwrap().is_always_green());
    }

    #[tokio::test]
    async fn test_many_names_share_one_pulse() {
        let pulses = PulseRegistry::default();
        let pulse = pulses.create_local("budget", 1, 10.0).unwrap();
        let lights = TrafficLightRegistry::new();
        lights.register(TrafficLight::new("a", Some(Arc::clone(&pulse))));
        lights.register(TrafficLight::new("b", Some(pulse)));

        let start = Instant::now();
        for name in ["a", "b", "a", "b"] {
            lights.wait_for_green(name, 1).await.unwrap();
        }
        // one 10Hz budget: four permits take ~400ms
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}
