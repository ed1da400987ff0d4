// 地理围栏判定，无状态纯函数

/// 计算两个经纬度坐标之间的球面距离（Haversine公式），单位公里
pub fn calculate_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let r = 6371.0; // 地球半径（公里）
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    r * c
}

/// 判断用户当前位置是否落在目标坐标的围栏半径内
pub fn is_within_radius(
    user_lat: f64,
    user_lng: f64,
    target_lat: f64,
    target_lng: f64,
    radius_km: f64,
) -> bool {
    calculate_distance(user_lat, user_lng, target_lat, target_lng) <= radius_km
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_is_within_any_radius() {
        assert_eq!(calculate_distance(0.0, 0.0, 0.0, 0.0), 0.0);
        assert!(is_within_radius(0.0, 0.0, 0.0, 0.0, 0.0));
        assert!(is_within_radius(31.2304, 121.4737, 31.2304, 121.4737, 0.5));
    }

    #[test]
    fn distance_is_symmetric() {
        let d1 = calculate_distance(31.2304, 121.4737, 39.9042, 116.4074);
        let d2 = calculate_distance(39.9042, 116.4074, 31.2304, 121.4737);
        assert!((d1 - d2).abs() < 1e-9);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = calculate_distance(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111.19).abs() < 0.1, "got {}", d);
    }

    #[test]
    fn stable_for_distances_of_tens_of_meters() {
        // 赤道上约 0.0005 度经度 ≈ 55.6 米
        let d = calculate_distance(0.0, 0.0, 0.0, 0.0005);
        assert!((d - 0.0556).abs() < 0.001, "got {}", d);
        assert!(is_within_radius(0.0, 0.0, 0.0, 0.0005, 0.5));
    }

    #[test]
    fn stable_at_high_latitudes_and_antimeridian() {
        // 高纬度短距离
        let d = calculate_distance(78.2232, 15.6267, 78.2232, 15.6500);
        assert!(d > 0.0 && d < 1.0, "got {}", d);
        // 跨越 180 度经线
        let d = calculate_distance(0.0, 179.9995, 0.0, -179.9995);
        assert!(d < 0.2, "got {}", d);
    }

    #[test]
    fn two_km_away_fails_default_radius() {
        // 赤道上 0.018 度纬度 ≈ 2 公里
        let d = calculate_distance(0.0, 0.0, 0.018, 0.0);
        assert!((d - 2.0).abs() < 0.01, "got {}", d);
        assert!(!is_within_radius(0.0, 0.0, 0.018, 0.0, 0.5));
    }
}
