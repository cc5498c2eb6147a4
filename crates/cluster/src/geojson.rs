//! GeoJSON rendering of query partitions for the two backing sources.

use serde_json::{Map, Value, json};

use crate::feature::{ClusterFeature, ClusterId, Partition, SpatialFeature};

pub fn empty_collection() -> Value {
    json!({ "type": "FeatureCollection", "features": [] })
}

fn point_geometry(position: [f64; 2]) -> Value {
    json!({ "type": "Point", "coordinates": position })
}

fn cluster_id_value(id: &ClusterId) -> Value {
    match id {
        ClusterId::Index(raw) => json!(raw),
        ClusterId::Single(_) => json!(id.to_string()),
    }
}

pub fn cluster_feature(c: &ClusterFeature) -> Value {
    let id = cluster_id_value(&c.id);
    json!({
        "type": "Feature",
        "id": id,
        "geometry": point_geometry(c.position.to_array()),
        "properties": {
            "cluster": true,
            "cluster_id": id,
            "point_count": c.point_count,
            "point_count_abbreviated": c.abbreviated(),
        },
    })
}

pub fn point_feature(p: &SpatialFeature) -> Value {
    let mut properties: Map<String, Value> = p.properties.clone();
    properties.insert("device_id".into(), json!(p.device_id.as_str()));
    json!({
        "type": "Feature",
        "id": p.device_id.as_str(),
        "geometry": point_geometry(p.position.to_array()),
        "properties": properties,
    })
}

/// Collection for the `clusters` source.
pub fn clusters_collection(partition: &Partition) -> Value {
    let features: Vec<Value> = partition.clusters.iter().map(cluster_feature).collect();
    json!({ "type": "FeatureCollection", "features": features })
}

/// Collection for the `unclustered-points` source.
pub fn points_collection(partition: &Partition) -> Value {
    let features: Vec<Value> = partition.points.iter().map(point_feature).collect();
    json!({ "type": "FeatureCollection", "features": features })
}

#[cfg(test)]
mod tests {
    use foundation::LngLat;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{clusters_collection, points_collection};
    use crate::feature::{ClusterFeature, ClusterId, Partition, SpatialFeature};

    #[test]
    fn renders_both_collections() {
        let partition = Partition {
            clusters: vec![
                ClusterFeature {
                    id: ClusterId::Index(70),
                    position: LngLat::new(1.0, 2.0),
                    point_count: 1500,
                },
                ClusterFeature {
                    id: ClusterId::single("t1"),
                    position: LngLat::new(3.0, 4.0),
                    point_count: 1,
                },
            ],
            points: vec![SpatialFeature::new("t2", LngLat::new(5.0, 6.0)).with_property("kind", "truck")],
        };

        let clusters = clusters_collection(&partition);
        assert_eq!(clusters["features"][0]["properties"]["cluster_id"], json!(70));
        assert_eq!(clusters["features"][0]["properties"]["point_count_abbreviated"], json!("1.5k"));
        assert_eq!(clusters["features"][1]["id"], json!("single-t1"));
        assert_eq!(clusters["features"][1]["geometry"]["coordinates"], json!([3.0, 4.0]));

        let points = points_collection(&partition);
        assert_eq!(
            points["features"][0]["properties"],
            json!({ "kind": "truck", "device_id": "t2" })
        );
    }
}
