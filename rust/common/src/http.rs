use serde::{Deserialize, Serialize};

/// One housing unit described by the eight California-housing features.
///
/// Field order is the column order every model artifact is exported with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    #[serde(rename = "MedInc")]
    pub med_inc: f64,
    #[serde(rename = "HouseAge")]
    pub house_age: f64,
    #[serde(rename = "AveRooms")]
    pub ave_rooms: f64,
    #[serde(rename = "AveBedrms")]
    pub ave_bedrms: f64,
    #[serde(rename = "Population")]
    pub population: f64,
    #[serde(rename = "AveOccup")]
    pub ave_occup: f64,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
}

impl FeatureVector {
    pub const LEN: usize = 8;

    /// Wire names in model column order.
    pub const FIELD_NAMES: [&'static str; Self::LEN] = [
        "MedInc",
        "HouseAge",
        "AveRooms",
        "AveBedrms",
        "Population",
        "AveOccup",
        "Latitude",
        "Longitude",
    ];

    pub fn from_array(values: [f64; Self::LEN]) -> Self {
        let [med_inc, house_age, ave_rooms, ave_bedrms, population, ave_occup, latitude, longitude] =
            values;
        Self {
            med_inc,
            house_age,
            ave_rooms,
            ave_bedrms,
            population,
            ave_occup,
            latitude,
            longitude,
        }
    }

    pub fn to_array(&self) -> [f64; Self::LEN] {
        [
            self.med_inc,
            self.house_age,
            self.ave_rooms,
            self.ave_bedrms,
            self.population,
            self.ave_occup,
            self.latitude,
            self.longitude,
        ]
    }

    /// The first row of the California housing dataset.
    pub fn example() -> Self {
        Self::from_array([
            8.3252, 41.0, 6.984127, 1.02381, 322.0, 2.555556, 37.88, -122.23,
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predictions: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_vector_uses_wire_names() {
        let value = serde_json::to_value(FeatureVector::example()).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.len(), FeatureVector::LEN);
        for name in FeatureVector::FIELD_NAMES {
            assert!(object.contains_key(name), "missing {}", name);
        }
        assert_eq!(object["MedInc"], 8.3252);
        assert_eq!(object["Longitude"], -122.23);
    }

    #[test]
    fn test_array_order_matches_field_names() {
        let features = FeatureVector::example();
        let value = serde_json::to_value(features).unwrap();

        for (name, expected) in FeatureVector::FIELD_NAMES.iter().zip(features.to_array()) {
            assert_eq!(value[*name].as_f64().unwrap(), expected);
        }
        assert_eq!(FeatureVector::from_array(features.to_array()), features);
    }
}
