//! Crystal structures: formula, dimensionality and CIF/XYZ export

use super::{formats_of, Download, NodeSubtype, SubtypeHandler};
use crate::error::{RestError, RestResult};
use crate::graph::Node;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;

const DEFAULT_FORMAT: &str = "cif";

type Vec3 = [f64; 3];

fn default_pbc() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct Kind {
    name: String,
    symbols: Vec<String>,
    #[serde(default)]
    weights: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct Site {
    kind_name: String,
    position: Vec3,
}

/// Structure payload as stored in node attributes
#[derive(Debug, Clone, Deserialize)]
struct Structure {
    cell: [Vec3; 3],
    #[serde(default = "default_pbc")]
    pbc1: bool,
    #[serde(default = "default_pbc")]
    pbc2: bool,
    #[serde(default = "default_pbc")]
    pbc3: bool,
    #[serde(default)]
    kinds: Vec<Kind>,
    #[serde(default)]
    sites: Vec<Site>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dimensionality {
    pub dim: usize,
    pub label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

fn dot(a: &Vec3, b: &Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: &Vec3, b: &Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn norm(a: &Vec3) -> f64 {
    dot(a, a).sqrt()
}

fn angle_deg(a: &Vec3, b: &Vec3) -> f64 {
    (dot(a, b) / (norm(a) * norm(b))).clamp(-1.0, 1.0).acos().to_degrees()
}

impl Structure {
    fn from_node(node: &Node) -> RestResult<Self> {
        serde_json::from_value(Value::Object(node.attributes.clone()))
            .map_err(|e| RestError::validation(format!("node {} is not a valid structure: {}", node.id, e)))
    }

    fn kind(&self, name: &str) -> RestResult<&Kind> {
        self.kinds
            .iter()
            .find(|k| k.name == name)
            .ok_or_else(|| RestError::validation(format!("site refers to unknown kind `{}`", name)))
    }

    /// Chemical symbol string of a site's kind; alloys render as `{AaX.XXBbY.YY}`
    fn site_symbol(&self, site: &Site) -> RestResult<String> {
        let kind = self.kind(&site.kind_name)?;
        if kind.symbols.len() == 1 {
            return Ok(kind.symbols[0].clone());
        }
        let mut out = String::from("{");
        for (i, symbol) in kind.symbols.iter().enumerate() {
            let weight = kind.weights.get(i).copied().unwrap_or_default();
            let _ = write!(out, "{}{:.2}", symbol, weight);
        }
        out.push('}');
        Ok(out)
    }

    /// Hill-ordered formula: carbon, hydrogen, then alphabetical
    fn formula(&self) -> RestResult<String> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for site in &self.sites {
            *counts.entry(self.site_symbol(site)?).or_default() += 1;
        }

        let mut order: Vec<String> = Vec::new();
        if counts.contains_key("C") {
            order.push("C".into());
            if counts.contains_key("H") {
                order.push("H".into());
            }
        }
        let rest: Vec<String> = counts.keys().filter(|s| !order.contains(s)).cloned().collect();
        order.extend(rest);

        let mut formula = String::new();
        for symbol in order {
            let n = counts[&symbol];
            formula.push_str(&symbol);
            if n > 1 {
                let _ = write!(formula, "{}", n);
            }
        }
        Ok(formula)
    }

    fn periodic_vectors(&self) -> Vec<&Vec3> {
        [self.pbc1, self.pbc2, self.pbc3]
            .iter()
            .zip(self.cell.iter())
            .filter(|(periodic, _)| **periodic)
            .map(|(_, v)| v)
            .collect()
    }

    fn dimensionality(&self) -> Dimensionality {
        let vectors = self.periodic_vectors();
        let (label, value) = match vectors.as_slice() {
            [] => ("", None),
            [a] => ("length", Some(norm(a))),
            [a, b] => ("surface", Some(norm(&cross(a, b)))),
            _ => (
                "volume",
                Some(dot(&self.cell[0], &cross(&self.cell[1], &self.cell[2]))),
            ),
        };
        Dimensionality {
            dim: vectors.len(),
            label,
            value,
        }
    }

    /// Cartesian to fractional conversion matrix (inverse of the cell)
    fn inverse_cell(&self) -> RestResult<[Vec3; 3]> {
        let [a, b, c] = &self.cell;
        let det = dot(a, &cross(b, c));
        if det.abs() < 1e-12 {
            return Err(RestError::validation("cannot export a structure with a singular cell"));
        }
        // Columns of the inverse are the reciprocal vectors
        let (ra, rb, rc) = (cross(b, c), cross(c, a), cross(a, b));
        let mut inverse = [[0.0; 3]; 3];
        for i in 0..3 {
            inverse[i] = [ra[i] / det, rb[i] / det, rc[i] / det];
        }
        Ok(inverse)
    }

    fn to_cif(&self, name: &str) -> RestResult<String> {
        let inverse = self.inverse_cell()?;
        let [a, b, c] = &self.cell;
        let mut out = String::new();
        let _ = writeln!(out, "data_{}", name);
        let _ = writeln!(out, "_cell_length_a    {:.8}", norm(a));
        let _ = writeln!(out, "_cell_length_b    {:.8}", norm(b));
        let _ = writeln!(out, "_cell_length_c    {:.8}", norm(c));
        let _ = writeln!(out, "_cell_angle_alpha {:.8}", angle_deg(b, c));
        let _ = writeln!(out, "_cell_angle_beta  {:.8}", angle_deg(a, c));
        let _ = writeln!(out, "_cell_angle_gamma {:.8}", angle_deg(a, b));
        out.push_str("_symmetry_space_group_name_H-M 'P 1'\n");
        out.push_str("_symmetry_Int_Tables_number 1\n");
        out.push_str("loop_\n_atom_site_label\n_atom_site_type_symbol\n");
        out.push_str("_atom_site_fract_x\n_atom_site_fract_y\n_atom_site_fract_z\n_atom_site_occupancy\n");

        let mut seen: BTreeMap<String, usize> = BTreeMap::new();
        for site in &self.sites {
            let kind = self.kind(&site.kind_name)?;
            let p = &site.position;
            let frac: Vec<f64> = (0..3)
                .map(|j| p[0] * inverse[0][j] + p[1] * inverse[1][j] + p[2] * inverse[2][j])
                .collect();
            for (i, symbol) in kind.symbols.iter().enumerate() {
                let n = seen.entry(symbol.clone()).or_default();
                *n += 1;
                let occupancy = kind.weights.get(i).copied().unwrap_or(1.0);
                let _ = writeln!(
                    out,
                    "{}{} {} {:.8} {:.8} {:.8} {:.4}",
                    symbol, n, symbol, frac[0], frac[1], frac[2], occupancy
                );
            }
        }
        Ok(out)
    }

    fn to_xyz(&self) -> RestResult<String> {
        let flags: Vec<&str> = [self.pbc1, self.pbc2, self.pbc3]
            .iter()
            .map(|p| if *p { "T" } else { "F" })
            .collect();
        let lattice: Vec<String> = self.cell.iter().flatten().map(|x| format!("{:.8}", x)).collect();

        let mut out = String::new();
        let _ = writeln!(out, "{}", self.sites.len());
        let _ = writeln!(out, "Lattice=\"{}\" pbc=\"{}\"", lattice.join(" "), flags.join(" "));
        for site in &self.sites {
            let [x, y, z] = site.position;
            let _ = writeln!(out, "{} {:.8} {:.8} {:.8}", self.site_symbol(site)?, x, y, z);
        }
        Ok(out)
    }
}

/// Handler for `StructureData` nodes
#[derive(Debug, Default)]
pub struct StructureHandler;

impl SubtypeHandler for StructureHandler {
    fn description(&self, node: &Node) -> RestResult<String> {
        Structure::from_node(node)?.formula()
    }

    fn derived_properties(&self, node: &Node) -> RestResult<Value> {
        let structure = Structure::from_node(node)?;
        Ok(serde_json::json!({
            "dimensionality": structure.dimensionality(),
            "formula": structure.formula()?,
        }))
    }

    fn download_formats(&self, _node: &Node) -> RestResult<Vec<String>> {
        Ok(formats_of(NodeSubtype::Structure)
            .iter()
            .map(|f| f.to_string())
            .collect())
    }

    fn download(&self, node: &Node, format: Option<&str>) -> RestResult<Download> {
        let format = format.unwrap_or(DEFAULT_FORMAT);
        let structure = Structure::from_node(node)?;
        let data = match format {
            "cif" => structure.to_cif(&node.uuid.simple().to_string())?,
            "xyz" => structure.to_xyz()?,
            other => {
                return Err(RestError::validation(format!(
                    "format `{}` is not supported; use one of {:?}",
                    other,
                    formats_of(NodeSubtype::Structure)
                )))
            }
        };
        Ok(Download {
            filename: format!("{}_structure.{}", node.uuid, format),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn ethanol_in_box() -> Node {
        let mut node = Node::new(1, "data.structure.StructureData.")
            .with_attribute("cell", json!([[10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]]))
            .with_attribute(
                "kinds",
                json!([
                    {"name": "C", "symbols": ["C"], "weights": [1.0]},
                    {"name": "H", "symbols": ["H"], "weights": [1.0]},
                    {"name": "O", "symbols": ["O"], "weights": [1.0]}
                ]),
            );
        let mut sites = Vec::new();
        for (kind, n) in [("C", 2), ("H", 6), ("O", 1)] {
            for i in 0..n {
                sites.push(json!({"kind_name": kind, "position": [i as f64, 1.0, 5.0]}));
            }
        }
        node = node.with_attribute("sites", Value::Array(sites));
        node
    }

    fn silicon() -> Node {
        Node::new(2, "data.structure.StructureData.")
            .with_attribute("cell", json!([[0.0, 2.7, 2.7], [2.7, 0.0, 2.7], [2.7, 2.7, 0.0]]))
            .with_attribute("kinds", json!([{"name": "Si", "symbols": ["Si"], "weights": [1.0]}]))
            .with_attribute(
                "sites",
                json!([
                    {"kind_name": "Si", "position": [0.0, 0.0, 0.0]},
                    {"kind_name": "Si", "position": [1.35, 1.35, 1.35]}
                ]),
            )
    }

    #[test]
    fn test_hill_formula() {
        let structure = Structure::from_node(&ethanol_in_box()).unwrap();
        assert_eq!(structure.formula().unwrap(), "C2H6O");
        let si = Structure::from_node(&silicon()).unwrap();
        assert_eq!(si.formula().unwrap(), "Si2");
    }

    #[test]
    fn test_dimensionality() {
        let si = Structure::from_node(&silicon()).unwrap();
        let dim = si.dimensionality();
        assert_eq!(dim.dim, 3);
        assert_eq!(dim.label, "volume");
        assert!((dim.value.unwrap() - 39.366).abs() < 1e-3);

        let slab = Structure::from_node(&silicon().with_attribute("pbc3", json!(false))).unwrap();
        assert_eq!(slab.dimensionality().label, "surface");

        let molecule = Structure::from_node(
            &ethanol_in_box()
                .with_attribute("pbc1", json!(false))
                .with_attribute("pbc2", json!(false))
                .with_attribute("pbc3", json!(false)),
        )
        .unwrap();
        assert_eq!(molecule.dimensionality().dim, 0);
        assert!(molecule.dimensionality().value.is_none());
    }

    #[test]
    fn test_derived_properties_shape() {
        let props = StructureHandler.derived_properties(&silicon()).unwrap();
        assert_eq!(props["formula"], "Si2");
        assert_eq!(props["dimensionality"]["dim"], 3);
    }

    #[test]
    fn test_cif_export_uses_fractional_coordinates() {
        let node = silicon();
        let download = StructureHandler.download(&node, None).unwrap();
        assert_eq!(download.filename, format!("{}_structure.cif", node.uuid));
        assert!(download.data.contains("_cell_angle_alpha 60.00000000"));
        assert!(download.data.contains("Si2 Si 0.25000000 0.25000000 0.25000000 1.0000"));
    }

    #[test]
    fn test_xyz_export() {
        let download = StructureHandler.download(&silicon(), Some("xyz")).unwrap();
        let mut lines = download.data.lines();
        assert_eq!(lines.next(), Some("2"));
        assert!(lines.next().unwrap().ends_with("pbc=\"T T T\""));
        assert_eq!(lines.next(), Some("Si 0.00000000 0.00000000 0.00000000"));
    }

    #[test]
    fn test_unsupported_format_and_malformed_node() {
        let err = StructureHandler.download(&silicon(), Some("pdb")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let bare = Node::new(3, "data.structure.StructureData.");
        assert_eq!(
            StructureHandler.derived_properties(&bare).unwrap_err().kind(),
            ErrorKind::Validation
        );
    }
}
