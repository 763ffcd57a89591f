use std::collections::HashSet;

/// Cities the server has confirmed as subscribed.
///
/// Only `subscriptionConfirmed` frames change this set; a subscribe request
/// that the server never confirms leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    cities: HashSet<String>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a confirmation. Returns `true` if the set changed.
    pub fn apply(&mut self, city: &str, subscribed: bool) -> bool {
        if subscribed {
            self.cities.insert(city.to_string())
        } else {
            self.cities.remove(city)
        }
    }

    pub fn contains(&self, city: &str) -> bool {
        self.cities.contains(city)
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    pub fn clear(&mut self) {
        self.cities.clear();
    }

    /// Subscribed cities in display order.
    ///
    /// Cities follow the server's `available` order; any confirmed city the
    /// server did not list comes last, alphabetically.
    pub fn ordered(&self, available: &[String]) -> Vec<String> {
        let mut ordered: Vec<String> = available
            .iter()
            .filter(|city| self.cities.contains(city.as_str()))
            .cloned()
            .collect();

        let mut unlisted: Vec<String> = self
            .cities
            .iter()
            .filter(|city| !available.contains(city))
            .cloned()
            .collect();
        unlisted.sort();

        ordered.extend(unlisted);
        ordered
    }
}
