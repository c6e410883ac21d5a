pub mod geometry {
    use glam::{DVec2, DVec3};
    use serde::{Deserialize, Serialize};

    /// 连接性与竖井邻近判断使用的默认容差（图纸单位）。
    pub const DEFAULT_TOLERANCE: f64 = 0.5;

    /// 参数化求交时判定“平行”的分母阈值。
    const PARALLEL_EPSILON: f64 = 1e-10;

    /// 三维点，内部以 `glam::DVec3` 表示。平面图纸数据的 z 恒为 0。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        /// 平面点，z 取 0。
        #[inline]
        pub fn planar(x: f64, y: f64) -> Self {
            Self(DVec3::new(x, y, 0.0))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        /// 投影到 XY 平面。
        #[inline]
        pub fn xy(self) -> DVec2 {
            self.0.truncate()
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框，用于统计参与计算的图元范围。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: DVec2,
        max: DVec2,
    }

    impl Bounds2D {
        #[inline]
        pub fn empty() -> Self {
            Self {
                min: DVec2::splat(f64::INFINITY),
                max: DVec2::splat(f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x > self.max.x || self.min.y > self.max.y
        }

        #[inline]
        pub fn min(&self) -> DVec2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> DVec2 {
            self.max
        }

        pub fn include_point(&mut self, point: Point3) {
            let xy = point.xy();
            self.min = self.min.min(xy);
            self.max = self.max.max(xy);
        }

        pub fn include_bounds(&mut self, other: &Bounds2D) {
            if other.is_empty() {
                return;
            }
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    impl Default for Bounds2D {
        fn default() -> Self {
            Self::empty()
        }
    }

    /// 三维欧氏距离。
    #[inline]
    pub fn distance(a: Point3, b: Point3) -> f64 {
        a.0.distance(b.0)
    }

    /// 多段线长度：相邻顶点距离之和，少于两个顶点时为 0。
    pub fn polyline_length(vertices: &[Point3]) -> f64 {
        vertices
            .windows(2)
            .map(|pair| distance(pair[0], pair[1]))
            .sum()
    }

    /// 以 `vertex` 为顶点的夹角（度），范围 [0, 180]。
    ///
    /// 余弦值先钳制到 [-1, 1]，避免浮点误差导致 `acos` 返回 NaN。
    /// 任一边长度为 0 时返回 0。
    pub fn angle_between(first: Point3, vertex: Point3, third: Point3) -> f64 {
        let leg_a = first.0 - vertex.0;
        let leg_b = third.0 - vertex.0;
        let magnitude = leg_a.length() * leg_b.length();
        if magnitude <= f64::EPSILON {
            return 0.0;
        }
        (leg_a.dot(leg_b) / magnitude)
            .clamp(-1.0, 1.0)
            .acos()
            .to_degrees()
    }

    /// 两条线段在 XY 平面内的交点，z 沿第一条线段插值。
    ///
    /// 平行、共线或退化（零长度）线段一律返回 `None`，不做重叠检测。
    pub fn segment_intersection(a1: Point3, a2: Point3, b1: Point3, b2: Point3) -> Option<Point3> {
        let dir_a = a2.xy() - a1.xy();
        let dir_b = b2.xy() - b1.xy();
        let denominator = dir_b.y * dir_a.x - dir_b.x * dir_a.y;
        if denominator.abs() < PARALLEL_EPSILON {
            return None;
        }

        let offset = a1.xy() - b1.xy();
        let ua = (dir_b.x * offset.y - dir_b.y * offset.x) / denominator;
        if !(0.0..=1.0).contains(&ua) {
            return None;
        }
        let ub = (dir_a.x * offset.y - dir_a.y * offset.x) / denominator;
        if !(0.0..=1.0).contains(&ub) {
            return None;
        }

        Some(Point3(a1.0 + (a2.0 - a1.0) * ua))
    }

    /// 线段是否相交。已知限制：平行/共线/退化线段返回 false。
    #[inline]
    pub fn segments_intersect(a1: Point3, a2: Point3, b1: Point3, b2: Point3) -> bool {
        segment_intersection(a1, a2, b1, b2).is_some()
    }

    /// 点到线段（XY 平面，投影参数钳制到端点）的距离是否不超过 `tolerance`。
    /// 零长度线段不视为可连接。
    pub fn point_near_segment(point: Point3, start: Point3, end: Point3, tolerance: f64) -> bool {
        let origin = start.xy();
        let direction = end.xy() - origin;
        let length_squared = direction.length_squared();
        if length_squared <= f64::EPSILON {
            return false;
        }
        let t = ((point.xy() - origin).dot(direction) / length_squared).clamp(0.0, 1.0);
        let closest = origin + direction * t;
        point.xy().distance(closest) <= tolerance
    }

    pub fn point_near_polyline(point: Point3, vertices: &[Point3], tolerance: f64) -> bool {
        vertices
            .windows(2)
            .any(|segment| point_near_segment(point, segment[0], segment[1], tolerance))
    }

    pub fn polylines_intersect(first: &[Point3], second: &[Point3]) -> bool {
        first.windows(2).any(|a| {
            second
                .windows(2)
                .any(|b| segments_intersect(a[0], a[1], b[0], b[1]))
        })
    }

    /// 判断多段线是否存在接近 `target_degrees` 的内角（如 45° 弯头）。
    pub fn has_angle_near(
        vertices: &[Point3],
        target_degrees: f64,
        tolerance_degrees: f64,
    ) -> bool {
        vertices.windows(3).any(|corner| {
            let angle = angle_between(corner[0], corner[1], corner[2]);
            (angle - target_degrees).abs() < tolerance_degrees
        })
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn distance_defaults_missing_z_to_zero() {
            let a = Point3::planar(0.0, 0.0);
            let b = Point3::new(3.0, 4.0, 0.0);
            assert!((distance(a, b) - 5.0).abs() < 1e-12);
            let c = Point3::new(3.0, 4.0, 12.0);
            assert!((distance(a, c) - 13.0).abs() < 1e-12);
        }

        #[test]
        fn polyline_length_sums_segments_not_endpoints() {
            let path = [
                Point3::planar(0.0, 0.0),
                Point3::planar(3.0, 0.0),
                Point3::planar(3.0, 4.0),
            ];
            assert!((polyline_length(&path) - 7.0).abs() < 1e-12);
            assert_eq!(polyline_length(&path[..1]), 0.0);
            assert_eq!(polyline_length(&[]), 0.0);
        }

        #[test]
        fn polyline_length_matches_pairwise_sum() {
            let path: Vec<Point3> = (0..12)
                .map(|i| {
                    let t = i as f64;
                    Point3::new(t * 1.5, (t * 0.7).sin() * 4.0, t * 0.25)
                })
                .collect();
            let expected: f64 = (0..path.len() - 1)
                .map(|i| distance(path[i], path[i + 1]))
                .sum();
            assert!((polyline_length(&path) - expected).abs() < 1e-12);
        }

        #[test]
        fn angle_between_covers_full_range() {
            let vertex = Point3::planar(0.0, 0.0);
            let right = Point3::planar(1.0, 0.0);
            assert!((angle_between(right, vertex, Point3::planar(0.0, 2.0)) - 90.0).abs() < 1e-9);
            assert!((angle_between(right, vertex, Point3::planar(-3.0, 0.0)) - 180.0).abs() < 1e-9);
            assert!(angle_between(right, vertex, Point3::planar(5.0, 0.0)).abs() < 1e-6);
            assert!((angle_between(right, vertex, Point3::planar(1.0, 1.0)) - 45.0).abs() < 1e-9);
        }

        #[test]
        fn angle_between_degenerate_leg_is_zero() {
            let p = Point3::planar(1.0, 1.0);
            assert_eq!(angle_between(p, p, Point3::planar(2.0, 2.0)), 0.0);
        }

        #[test]
        fn crossing_segments_intersect_at_midpoint() {
            let hit = segment_intersection(
                Point3::planar(0.0, 0.0),
                Point3::planar(10.0, 10.0),
                Point3::planar(0.0, 10.0),
                Point3::planar(10.0, 0.0),
            )
            .expect("segments should cross");
            assert!((hit.x() - 5.0).abs() < 1e-9);
            assert!((hit.y() - 5.0).abs() < 1e-9);
        }

        #[test]
        fn intersection_interpolates_z_along_first_segment() {
            let hit = segment_intersection(
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(10.0, 0.0, 20.0),
                Point3::planar(2.5, -1.0),
                Point3::planar(2.5, 1.0),
            )
            .expect("segments should cross");
            assert!((hit.z() - 5.0).abs() < 1e-9);
        }

        #[test]
        fn disjoint_segments_do_not_intersect() {
            assert!(!segments_intersect(
                Point3::planar(0.0, 0.0),
                Point3::planar(1.0, 1.0),
                Point3::planar(5.0, 0.0),
                Point3::planar(6.0, -3.0),
            ));
        }

        #[test]
        fn parallel_and_colinear_segments_report_no_intersection() {
            // 共线重叠同样返回 false，属于已记录的简化。
            assert!(!segments_intersect(
                Point3::planar(0.0, 0.0),
                Point3::planar(10.0, 0.0),
                Point3::planar(5.0, 0.0),
                Point3::planar(15.0, 0.0),
            ));
            assert!(!segments_intersect(
                Point3::planar(0.0, 0.0),
                Point3::planar(10.0, 0.0),
                Point3::planar(0.0, 1.0),
                Point3::planar(10.0, 1.0),
            ));
            let p = Point3::planar(3.0, 3.0);
            assert!(!segments_intersect(
                p,
                p,
                Point3::planar(0.0, 0.0),
                Point3::planar(6.0, 6.0)
            ));
        }

        #[test]
        fn touching_endpoints_count_as_intersection() {
            assert!(segments_intersect(
                Point3::planar(0.0, 0.0),
                Point3::planar(10.0, 0.0),
                Point3::planar(10.0, 0.0),
                Point3::planar(10.0, 5.0),
            ));
        }

        #[test]
        fn point_near_segment_uses_clamped_distance() {
            let start = Point3::planar(0.0, 0.0);
            let end = Point3::planar(10.0, 0.0);
            assert!(point_near_segment(Point3::planar(5.0, 0.4), start, end, DEFAULT_TOLERANCE));
            assert!(point_near_segment(Point3::planar(5.0, 0.5), start, end, DEFAULT_TOLERANCE));
            assert!(!point_near_segment(Point3::planar(5.0, 0.6), start, end, DEFAULT_TOLERANCE));
            // 超出端点时按端点距离计算
            assert!(point_near_segment(Point3::planar(10.3, 0.3), start, end, DEFAULT_TOLERANCE));
            assert!(!point_near_segment(Point3::planar(11.0, 0.0), start, end, DEFAULT_TOLERANCE));
        }

        #[test]
        fn point_near_zero_length_segment_is_false() {
            let p = Point3::planar(1.0, 1.0);
            assert!(!point_near_segment(p, p, p, 10.0));
        }

        #[test]
        fn polyline_helpers_walk_every_segment() {
            let run = [
                Point3::planar(0.0, 0.0),
                Point3::planar(10.0, 0.0),
                Point3::planar(10.0, 10.0),
            ];
            assert!(point_near_polyline(Point3::planar(10.2, 6.0), &run, DEFAULT_TOLERANCE));
            assert!(!point_near_polyline(Point3::planar(5.0, 5.0), &run, DEFAULT_TOLERANCE));

            let crossing = [Point3::planar(5.0, 5.0), Point3::planar(15.0, 5.0)];
            let apart = [Point3::planar(20.0, 0.0), Point3::planar(30.0, 0.0)];
            assert!(polylines_intersect(&run, &crossing));
            assert!(!polylines_intersect(&run, &apart));
        }

        #[test]
        fn detects_forty_five_degree_corner() {
            let bent = [
                Point3::planar(10.0, 0.0),
                Point3::planar(0.0, 0.0),
                Point3::planar(10.0, 10.0),
            ];
            let square = [
                Point3::planar(10.0, 0.0),
                Point3::planar(0.0, 0.0),
                Point3::planar(0.0, 10.0),
            ];
            assert!(has_angle_near(&bent, 45.0, 5.0));
            assert!(!has_angle_near(&square, 45.0, 5.0));
            assert!(!has_angle_near(&bent[..2], 45.0, 5.0));
        }

        #[test]
        fn bounds_grow_with_points() {
            let mut bounds = Bounds2D::empty();
            assert!(bounds.is_empty());
            bounds.include_point(Point3::planar(-2.0, 4.0));
            bounds.include_point(Point3::planar(6.0, -1.0));
            assert!(!bounds.is_empty());
            assert_eq!(bounds.min(), DVec2::new(-2.0, -1.0));
            assert_eq!(bounds.max(), DVec2::new(6.0, 4.0));

            let mut outer = Bounds2D::empty();
            outer.include_bounds(&Bounds2D::empty());
            assert!(outer.is_empty());
            outer.include_bounds(&bounds);
            assert_eq!(outer, bounds);
        }
    }
}

pub mod drawing {
    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    use crate::geometry::{Bounds2D, Point3, polyline_length};

    /// 标记半径上限（不含），超出视为数据损坏。
    pub const MAX_MARKER_RADIUS: f64 = 1000.0;

    /// 外部读取器输出的坐标，缺省的 z 视为 0。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct PointRecord {
        pub x: f64,
        pub y: f64,
        #[serde(default)]
        pub z: f64,
    }

    impl PointRecord {
        #[inline]
        pub fn planar(x: f64, y: f64) -> Self {
            Self { x, y, z: 0.0 }
        }
    }

    impl From<PointRecord> for Point3 {
        fn from(value: PointRecord) -> Self {
            Point3::new(value.x, value.y, value.z)
        }
    }

    /// 外部 CAD 读取器交付的通用实体记录，几何字段按种类选填。
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct EntityRecord {
        #[serde(rename = "type")]
        pub kind: String,
        #[serde(default)]
        pub layer: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub vertices: Vec<PointRecord>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub center: Option<PointRecord>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub radius: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub insertion_point: Option<PointRecord>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub block_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub scale: Option<PointRecord>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub rotation: Option<f64>,
        /// 上游显式给出的卫生洁具类别，优先于图层名推断。
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub category: Option<String>,
    }

    impl EntityRecord {
        pub fn linear_run<I>(layer: impl Into<String>, vertices: I) -> Self
        where
            I: IntoIterator<Item = (f64, f64)>,
        {
            Self {
                kind: "LinearRun".to_string(),
                layer: layer.into(),
                vertices: vertices
                    .into_iter()
                    .map(|(x, y)| PointRecord::planar(x, y))
                    .collect(),
                ..Self::default()
            }
        }

        pub fn point_marker(layer: impl Into<String>, center: (f64, f64), radius: f64) -> Self {
            Self {
                kind: "PointMarker".to_string(),
                layer: layer.into(),
                center: Some(PointRecord::planar(center.0, center.1)),
                radius: Some(radius),
                ..Self::default()
            }
        }

        pub fn block_insert(
            layer: impl Into<String>,
            name: impl Into<String>,
            insertion: (f64, f64),
        ) -> Self {
            Self {
                kind: "BlockInsert".to_string(),
                layer: layer.into(),
                insertion_point: Some(PointRecord::planar(insertion.0, insertion.1)),
                block_name: Some(name.into()),
                ..Self::default()
            }
        }

        pub fn with_category(mut self, category: impl Into<String>) -> Self {
            self.category = Some(category.into());
            self
        }

        #[inline]
        pub fn kind(&self) -> EntityKind {
            EntityKind::from_type_name(&self.kind)
        }

        /// 将记录转换为强类型实体，几何信息不足时返回缺陷原因。
        pub fn to_entity(&self) -> Result<Entity, GeometryDefect> {
            match self.kind() {
                EntityKind::LinearRun => {
                    if self.vertices.len() < 2 {
                        return Err(GeometryDefect::TooFewVertices {
                            count: self.vertices.len(),
                        });
                    }
                    let run = LinearRun {
                        vertices: self.vertices.iter().copied().map(Point3::from).collect(),
                        layer: self.layer.clone(),
                    };
                    if run.length() <= 0.0 {
                        return Err(GeometryDefect::ZeroLength);
                    }
                    Ok(Entity::LinearRun(run))
                }
                EntityKind::PointMarker => {
                    let center = self.center.ok_or(GeometryDefect::MissingCenter)?;
                    let radius = self.radius.ok_or(GeometryDefect::MissingRadius)?;
                    if !(radius > 0.0 && radius < MAX_MARKER_RADIUS) {
                        return Err(GeometryDefect::RadiusOutOfRange { radius });
                    }
                    Ok(Entity::PointMarker(PointMarker {
                        center: center.into(),
                        radius,
                        layer: self.layer.clone(),
                    }))
                }
                EntityKind::BlockInsert => {
                    let insertion = self
                        .insertion_point
                        .ok_or(GeometryDefect::MissingInsertionPoint)?;
                    let name = self
                        .block_name
                        .as_deref()
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .ok_or(GeometryDefect::MissingBlockName)?;
                    let scale = self.scale.unwrap_or(PointRecord {
                        x: 1.0,
                        y: 1.0,
                        z: 1.0,
                    });
                    Ok(Entity::BlockInsert(BlockInsert {
                        name: name.to_string(),
                        insertion: insertion.into(),
                        scale: scale.into(),
                        rotation: self.rotation.unwrap_or(0.0),
                        layer: self.layer.clone(),
                    }))
                }
                EntityKind::Unrecognized => Err(GeometryDefect::UnrecognizedKind {
                    kind: self.kind.clone(),
                }),
            }
        }
    }

    /// 结构种类标签。DXF 原生类型名作为别名接受。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum EntityKind {
        LinearRun,
        PointMarker,
        BlockInsert,
        Unrecognized,
    }

    impl EntityKind {
        pub fn from_type_name(name: &str) -> Self {
            let name = name.trim();
            let is = |candidate: &str| name.eq_ignore_ascii_case(candidate);
            if is("LinearRun") || is("LWPOLYLINE") || is("POLYLINE") {
                EntityKind::LinearRun
            } else if is("PointMarker") || is("CIRCLE") {
                EntityKind::PointMarker
            } else if is("BlockInsert") || is("INSERT") {
                EntityKind::BlockInsert
            } else {
                EntityKind::Unrecognized
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum GeometryDefect {
        #[error("linear run needs at least 2 vertices, got {count}")]
        TooFewVertices { count: usize },
        #[error("linear run has zero length")]
        ZeroLength,
        #[error("point marker has no center")]
        MissingCenter,
        #[error("point marker has no radius")]
        MissingRadius,
        #[error("point marker radius {radius} is outside (0, 1000)")]
        RadiusOutOfRange { radius: f64 },
        #[error("block insert has no insertion point")]
        MissingInsertionPoint,
        #[error("block insert has no block name")]
        MissingBlockName,
        #[error("unrecognized entity type `{kind}`")]
        UnrecognizedKind { kind: String },
    }

    /// 管段（多段线），顶点顺序决定走向与线段相邻关系。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct LinearRun {
        pub vertices: Vec<Point3>,
        pub layer: String,
    }

    impl LinearRun {
        #[inline]
        pub fn length(&self) -> f64 {
            polyline_length(&self.vertices)
        }
    }

    /// 圆形管件标记。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PointMarker {
        pub center: Point3,
        pub radius: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct BlockInsert {
        pub name: String,
        pub insertion: Point3,
        pub scale: Point3,
        pub rotation: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum Entity {
        LinearRun(LinearRun),
        PointMarker(PointMarker),
        BlockInsert(BlockInsert),
    }

    impl Entity {
        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::LinearRun(run) => &run.layer,
                Entity::PointMarker(marker) => &marker.layer,
                Entity::BlockInsert(insert) => &insert.layer,
            }
        }

        #[inline]
        pub fn kind(&self) -> EntityKind {
            match self {
                Entity::LinearRun(_) => EntityKind::LinearRun,
                Entity::PointMarker(_) => EntityKind::PointMarker,
                Entity::BlockInsert(_) => EntityKind::BlockInsert,
            }
        }

        /// 管件的定位点；管段没有单一定位点。
        pub fn anchor(&self) -> Option<Point3> {
            match self {
                Entity::LinearRun(_) => None,
                Entity::PointMarker(marker) => Some(marker.center),
                Entity::BlockInsert(insert) => Some(insert.insertion),
            }
        }

        /// 2D 范围，块参照退化为插入点。
        pub fn bounds(&self) -> Bounds2D {
            let mut bounds = Bounds2D::empty();
            match self {
                Entity::LinearRun(run) => {
                    for vertex in &run.vertices {
                        bounds.include_point(*vertex);
                    }
                }
                Entity::PointMarker(marker) => {
                    let r = marker.radius.abs();
                    let c = marker.center;
                    bounds.include_point(Point3::new(c.x() - r, c.y() - r, c.z()));
                    bounds.include_point(Point3::new(c.x() + r, c.y() + r, c.z()));
                }
                Entity::BlockInsert(insert) => bounds.include_point(insert.insertion),
            }
            bounds
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn kind_accepts_dxf_aliases() {
            assert_eq!(EntityKind::from_type_name("LinearRun"), EntityKind::LinearRun);
            assert_eq!(EntityKind::from_type_name("lwpolyline"), EntityKind::LinearRun);
            assert_eq!(EntityKind::from_type_name("POLYLINE"), EntityKind::LinearRun);
            assert_eq!(EntityKind::from_type_name("CIRCLE"), EntityKind::PointMarker);
            assert_eq!(EntityKind::from_type_name("INSERT"), EntityKind::BlockInsert);
            assert_eq!(EntityKind::from_type_name("HATCH"), EntityKind::Unrecognized);
            assert_eq!(EntityKind::from_type_name(""), EntityKind::Unrecognized);
        }

        #[test]
        fn record_deserializes_with_optional_z() {
            let raw = r#"{
                "type": "LinearRun",
                "layer": "GEB-SH-01-PIPE",
                "vertices": [{"x": 0, "y": 0}, {"x": 30, "y": 0, "z": 2.5}]
            }"#;
            let record: EntityRecord = serde_json::from_str(raw).expect("parse record");
            assert_eq!(record.kind(), EntityKind::LinearRun);
            assert_eq!(record.vertices[0].z, 0.0);
            assert_eq!(record.vertices[1].z, 2.5);
            assert!(record.category.is_none());
        }

        #[test]
        fn linear_run_requires_two_vertices_and_length() {
            let short = EntityRecord::linear_run("GEB", [(0.0, 0.0)]);
            assert_eq!(
                short.to_entity(),
                Err(GeometryDefect::TooFewVertices { count: 1 })
            );
            let collapsed = EntityRecord::linear_run("GEB", [(1.0, 1.0), (1.0, 1.0)]);
            assert_eq!(collapsed.to_entity(), Err(GeometryDefect::ZeroLength));

            let ok = EntityRecord::linear_run("GEB", [(0.0, 0.0), (30.0, 0.0), (30.0, 40.0)]);
            match ok.to_entity() {
                Ok(Entity::LinearRun(run)) => assert!((run.length() - 70.0).abs() < 1e-12),
                other => panic!("unexpected conversion result: {other:?}"),
            }
        }

        #[test]
        fn marker_radius_must_be_in_range() {
            let zero = EntityRecord::point_marker("GEB", (0.0, 0.0), 0.0);
            assert!(matches!(
                zero.to_entity(),
                Err(GeometryDefect::RadiusOutOfRange { .. })
            ));
            let huge = EntityRecord::point_marker("GEB", (0.0, 0.0), 1000.0);
            assert!(matches!(
                huge.to_entity(),
                Err(GeometryDefect::RadiusOutOfRange { .. })
            ));
            let mut missing = EntityRecord::point_marker("GEB", (0.0, 0.0), 5.0);
            missing.center = None;
            assert_eq!(missing.to_entity(), Err(GeometryDefect::MissingCenter));
        }

        #[test]
        fn block_insert_defaults_scale_and_rotation() {
            let record = EntityRecord::block_insert("GEB-SH-01", "  BEND-D75 ", (4.0, 2.0));
            match record.to_entity() {
                Ok(Entity::BlockInsert(insert)) => {
                    assert_eq!(insert.name, "BEND-D75");
                    assert_eq!(insert.scale, Point3::new(1.0, 1.0, 1.0));
                    assert_eq!(insert.rotation, 0.0);
                }
                other => panic!("unexpected conversion result: {other:?}"),
            }

            let blank = EntityRecord::block_insert("GEB", "   ", (0.0, 0.0));
            assert_eq!(blank.to_entity(), Err(GeometryDefect::MissingBlockName));
        }

        #[test]
        fn entity_bounds_cover_marker_extent() {
            let marker = EntityRecord::point_marker("GEB", (10.0, 10.0), 2.0)
                .to_entity()
                .expect("valid marker");
            let bounds = marker.bounds();
            assert_eq!(bounds.min().x, 8.0);
            assert_eq!(bounds.max().y, 12.0);
            assert_eq!(marker.anchor(), Some(Point3::planar(10.0, 10.0)));
        }
    }
}

pub mod material {
    use std::fmt;

    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    /// 公称管径，取值限定为 50 / 75 / 110 mm。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(try_from = "u32", into = "u32")]
    pub enum NominalDiameter {
        Dn50,
        Dn75,
        Dn110,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
    #[error("{0} mm is not a nominal diameter (expected 50, 75 or 110)")]
    pub struct NonCanonicalDiameter(pub u32);

    impl NominalDiameter {
        pub const ALL: [NominalDiameter; 3] = [
            NominalDiameter::Dn50,
            NominalDiameter::Dn75,
            NominalDiameter::Dn110,
        ];

        #[inline]
        pub fn millimetres(self) -> u32 {
            match self {
                NominalDiameter::Dn50 => 50,
                NominalDiameter::Dn75 => 75,
                NominalDiameter::Dn110 => 110,
            }
        }

        pub fn from_millimetres(value: u32) -> Option<Self> {
            Self::ALL
                .into_iter()
                .find(|diameter| diameter.millimetres() == value)
        }

        /// 吸附到最近的公称管径。距离相等时取较小值；
        /// 非有限值或非正值一律归为 50。
        pub fn nearest(value: f64) -> Self {
            if !value.is_finite() || value <= 0.0 {
                return NominalDiameter::Dn50;
            }
            let mut best = NominalDiameter::Dn50;
            let mut best_gap = f64::INFINITY;
            for candidate in Self::ALL {
                let gap = (value - f64::from(candidate.millimetres())).abs();
                // ALL 按升序排列，严格小于保证平局取较小值
                if gap < best_gap {
                    best = candidate;
                    best_gap = gap;
                }
            }
            best
        }
    }

    impl TryFrom<u32> for NominalDiameter {
        type Error = NonCanonicalDiameter;

        fn try_from(value: u32) -> Result<Self, Self::Error> {
            Self::from_millimetres(value).ok_or(NonCanonicalDiameter(value))
        }
    }

    impl From<NominalDiameter> for u32 {
        fn from(value: NominalDiameter) -> Self {
            value.millimetres()
        }
    }

    impl fmt::Display for NominalDiameter {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.millimetres())
        }
    }

    /// 卫生洁具类别。声明顺序即报表顺序，也是合并时的优先顺序。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum Category {
        WashBasin,
        Urinal,
        ShowerFloorDrain,
        BathTub,
        WaterCloset,
        VerticalShaft,
        Vent,
    }

    impl Category {
        pub const ALL: [Category; 7] = [
            Category::WashBasin,
            Category::Urinal,
            Category::ShowerFloorDrain,
            Category::BathTub,
            Category::WaterCloset,
            Category::VerticalShaft,
            Category::Vent,
        ];

        pub fn as_str(self) -> &'static str {
            match self {
                Category::WashBasin => "wash-basin",
                Category::Urinal => "urinal",
                Category::ShowerFloorDrain => "shower-floor-drain",
                Category::BathTub => "bath-tub",
                Category::WaterCloset => "water-closet",
                Category::VerticalShaft => "vertical-shaft",
                Category::Vent => "vent",
            }
        }

        /// 报表分节标题。
        pub fn label(self) -> &'static str {
            match self {
                Category::WashBasin => "WASH BASIN/SINK",
                Category::Urinal => "URINALS",
                Category::ShowerFloorDrain => "SHOWER/FLOOR DRAIN",
                Category::BathTub => "BATH TUB",
                Category::WaterCloset => "WATER CLOSET",
                Category::VerticalShaft => "VERTICAL SHAFT",
                Category::Vent => "VENT",
            }
        }

        /// 宽松解析：忽略大小写与分隔符（`-`、`_`、空格、`/`），另接受 `wc`。
        pub fn parse(raw: &str) -> Option<Self> {
            let squashed: String = raw
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .map(|c| c.to_ascii_lowercase())
                .collect();
            if squashed == "wc" {
                return Some(Category::WaterCloset);
            }
            Self::ALL.into_iter().find(|category| {
                category
                    .as_str()
                    .chars()
                    .filter(|c| *c != '-')
                    .eq(squashed.chars())
            })
        }
    }

    impl fmt::Display for Category {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    /// 管件子类型；管段统一为 `StraightRun`。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum Subtype {
        Bend,
        Branch,
        Coupling,
        Reducer,
        StraightRun,
    }

    impl Subtype {
        pub fn as_str(self) -> &'static str {
            match self {
                Subtype::Bend => "bend",
                Subtype::Branch => "branch",
                Subtype::Coupling => "coupling",
                Subtype::Reducer => "reducer",
                Subtype::StraightRun => "straight-run",
            }
        }
    }

    impl fmt::Display for Subtype {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum Unit {
        #[serde(rename = "PC")]
        Piece,
        #[serde(rename = "M")]
        Metre,
    }

    impl Unit {
        pub fn as_str(self) -> &'static str {
            match self {
                Unit::Piece => "PC",
                Unit::Metre => "M",
            }
        }
    }

    impl fmt::Display for Unit {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    /// 数量：PC 为整数计数，M 为实数长度（图纸单位 × 换算系数）。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum Quantity {
        Count(u64),
        Length(f64),
    }

    impl Quantity {
        #[inline]
        pub fn unit(self) -> Unit {
            match self {
                Quantity::Count(_) => Unit::Piece,
                Quantity::Length(_) => Unit::Metre,
            }
        }

        #[inline]
        pub fn as_f64(self) -> f64 {
            match self {
                Quantity::Count(count) => count as f64,
                Quantity::Length(length) => length,
            }
        }
    }

    impl fmt::Display for Quantity {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Quantity::Count(count) => write!(f, "{count}"),
                Quantity::Length(length) => write!(f, "{length:.3}"),
            }
        }
    }

    /// 竖井编号，例如 `SH-03`，统一为大写。
    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ShaftId(String);

    impl ShaftId {
        pub fn new(raw: impl AsRef<str>) -> Self {
            Self(raw.as_ref().to_ascii_uppercase())
        }

        #[inline]
        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl fmt::Display for ShaftId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    /// 目录查找键。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct CatalogKey {
        pub category: Category,
        pub diameter: NominalDiameter,
        pub subtype: Subtype,
    }

    impl CatalogKey {
        #[inline]
        pub fn new(category: Category, diameter: NominalDiameter, subtype: Subtype) -> Self {
            Self {
                category,
                diameter,
                subtype,
            }
        }
    }

    impl fmt::Display for CatalogKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}/{}/{}", self.category, self.diameter, self.subtype)
        }
    }

    /// 物料清单行。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct LineItem {
        pub article_no: String,
        pub description: String,
        pub unit: Unit,
        pub quantity: Quantity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub shaft_id: Option<ShaftId>,
        pub category: Category,
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn nearest_snaps_to_canonical_set() {
            assert_eq!(NominalDiameter::nearest(50.0), NominalDiameter::Dn50);
            assert_eq!(NominalDiameter::nearest(60.0), NominalDiameter::Dn50);
            assert_eq!(NominalDiameter::nearest(63.0), NominalDiameter::Dn75);
            assert_eq!(NominalDiameter::nearest(93.0), NominalDiameter::Dn110);
            assert_eq!(NominalDiameter::nearest(400.0), NominalDiameter::Dn110);
            assert_eq!(NominalDiameter::nearest(2.0), NominalDiameter::Dn50);
        }

        #[test]
        fn nearest_breaks_ties_downwards() {
            assert_eq!(NominalDiameter::nearest(62.5), NominalDiameter::Dn50);
            assert_eq!(NominalDiameter::nearest(92.5), NominalDiameter::Dn75);
        }

        #[test]
        fn nearest_maps_invalid_input_to_smallest() {
            assert_eq!(NominalDiameter::nearest(f64::NAN), NominalDiameter::Dn50);
            assert_eq!(NominalDiameter::nearest(-75.0), NominalDiameter::Dn50);
            assert_eq!(NominalDiameter::nearest(f64::INFINITY), NominalDiameter::Dn50);
        }

        #[test]
        fn diameter_serializes_as_number() {
            let json = serde_json::to_string(&NominalDiameter::Dn110).unwrap();
            assert_eq!(json, "110");
            let parsed: NominalDiameter = serde_json::from_str("75").unwrap();
            assert_eq!(parsed, NominalDiameter::Dn75);
            assert!(serde_json::from_str::<NominalDiameter>("63").is_err());
        }

        #[test]
        fn category_parse_is_lenient() {
            assert_eq!(Category::parse("wash-basin"), Some(Category::WashBasin));
            assert_eq!(Category::parse("Wash Basin"), Some(Category::WashBasin));
            assert_eq!(Category::parse("SHOWER_FLOOR_DRAIN"), Some(Category::ShowerFloorDrain));
            assert_eq!(Category::parse("WC"), Some(Category::WaterCloset));
            assert_eq!(Category::parse("bathtub"), Some(Category::BathTub));
            assert_eq!(Category::parse("kitchen"), None);
        }

        #[test]
        fn shaft_id_is_uppercased() {
            let id = ShaftId::new("sh-07");
            assert_eq!(id.as_str(), "SH-07");
            assert_eq!(id, ShaftId::new("SH-07"));
        }

        #[test]
        fn quantity_serializes_untagged() {
            assert_eq!(serde_json::to_string(&Quantity::Count(3)).unwrap(), "3");
            assert_eq!(serde_json::to_string(&Quantity::Length(2.5)).unwrap(), "2.5");
            assert_eq!(Quantity::Count(2).unit(), Unit::Piece);
            assert_eq!(Quantity::Length(1.0).unit(), Unit::Metre);
        }

        #[test]
        fn line_item_uses_camel_case_fields() {
            let item = LineItem {
                article_no: "361.045.16.1".to_string(),
                description: "bend PE-HD 45G d50 L4.5".to_string(),
                unit: Unit::Piece,
                quantity: Quantity::Count(2),
                shaft_id: Some(ShaftId::new("SH-01")),
                category: Category::WashBasin,
            };
            let value = serde_json::to_value(&item).unwrap();
            assert_eq!(value["articleNo"], "361.045.16.1");
            assert_eq!(value["unit"], "PC");
            assert_eq!(value["shaftId"], "SH-01");
            assert_eq!(value["category"], "wash-basin");
            assert_eq!(value["quantity"], 2);
        }
    }
}
