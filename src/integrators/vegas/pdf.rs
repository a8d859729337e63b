//! The adaptive grid of the VEGAS algorithm.
use crate::core::error::Error;
use crate::core::to_float;
use crate::distributed::Reduction;
use log::{debug, warn};
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

/// The blend of neighbouring bins applied to the adjustment data before the bins are compressed
/// with the exponent `alpha`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Smoothing {
    /// Replaces every bin with the mean of itself and its two neighbours; the boundary bins use
    /// the mean of themselves and their single neighbour.
    Average3,
    /// Weights the neighbours 1:6:1, the boundary bins 7:1.
    Weighted161,
    /// Uses the adjustment data as it is.
    None,
}

impl Default for Smoothing {
    fn default() -> Self {
        Self::Average3
    }
}

impl Smoothing {
    /// Applies the blend to `data`.
    pub fn apply<T: Float>(self, data: &[T]) -> Vec<T> {
        let n = data.len();

        // weights of the outer neighbours, the central bin and a boundary bin, and the norms of
        // the boundary and the inner sums
        let (outer, inner, boundary, norm_boundary, norm_inner) = match self {
            _ if n < 2 => return data.to_vec(),
            Self::None => return data.to_vec(),
            Self::Average3 => (1, 1, 1, 2, 3),
            Self::Weighted161 => (1, 6, 7, 8, 8),
        };

        let (outer, inner, boundary): (T, T, T) =
            (to_float(outer), to_float(inner), to_float(boundary));
        let (norm_boundary, norm_inner): (T, T) = (to_float(norm_boundary), to_float(norm_inner));

        let mut result = Vec::with_capacity(n);
        result.push((boundary * data[0] + outer * data[1]) / norm_boundary);

        for window in data.windows(3) {
            result.push((outer * window[0] + inner * window[1] + outer * window[2]) / norm_inner);
        }

        result.push((outer * data[n - 2] + boundary * data[n - 1]) / norm_boundary);

        result
    }
}

/// Per dimension and bin, the sum of the squared weighted integrand values of all points that
/// fell into the bin together with the number of these points.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VegasAdjustment<T> {
    squares: Vec<Vec<T>>,
    hits: Vec<Vec<usize>>,
}

impl<T: Float> VegasAdjustment<T> {
    /// Constructor for empty adjustment data.
    pub fn new(dimensions: usize, bins: usize) -> Self {
        Self {
            squares: vec![vec![T::zero(); bins]; dimensions],
            hits: vec![vec![0; bins]; dimensions],
        }
    }

    /// Records a point that fell into `bins` (one index per dimension) with the weighted value
    /// `value`. Non-finite values only count as a hit.
    pub fn fill(&mut self, bins: &[usize], value: T) {
        let square = value * value;

        for (dim, &bin) in bins.iter().enumerate() {
            self.hits[dim][bin] += 1;

            if square.is_finite() {
                self.squares[dim][bin] = self.squares[dim][bin] + square;
            }
        }
    }

    /// Returns the sums of squares of the bins of `dimension`.
    pub fn squares(&self, dimension: usize) -> &[T] {
        &self.squares[dimension]
    }

    /// Returns the number of points of the bins of `dimension`.
    pub fn hits(&self, dimension: usize) -> &[usize] {
        &self.hits[dimension]
    }

    /// The mean squared value per bin of `dimension`, zero for empty bins.
    fn mean_squares(&self, dimension: usize) -> Vec<T> {
        self.squares[dimension]
            .iter()
            .zip(&self.hits[dimension])
            .map(|(&square, &hits)| {
                if hits == 0 {
                    T::zero()
                } else {
                    square / to_float(hits)
                }
            })
            .collect()
    }

    pub(crate) fn push_into(&self, reduction: &mut Reduction<T>) {
        for (squares, hits) in self.squares.iter().zip(&self.hits) {
            reduction.push_values(squares);
            hits.iter().for_each(|&h| reduction.push_count(h));
        }
    }

    pub(crate) fn pop_from(&mut self, reduction: &mut Reduction<T>) {
        for (squares, hits) in self.squares.iter_mut().zip(&mut self.hits) {
            *squares = reduction.next_values(squares.len());
            hits.iter_mut().for_each(|h| *h = reduction.next_count());
        }
    }
}

/// The probability density of the VEGAS algorithm: a product of one-dimensional, piecewise
/// constant densities on the unit interval. Each dimension is divided into the same number of
/// bins with strictly increasing edges from zero to one; every bin carries the same probability.
///
/// Deserialized grids are checked like the ones created with [`VegasPdf::from_edges`].
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(
    try_from = "SavedVegasPdf<T>",
    bound(deserialize = "T: Float + Deserialize<'de>")
)]
pub struct VegasPdf<T> {
    edges: Vec<Vec<T>>,
}

#[derive(Deserialize)]
struct SavedVegasPdf<T> {
    edges: Vec<Vec<T>>,
}

impl<T: Float> TryFrom<SavedVegasPdf<T>> for VegasPdf<T> {
    type Error = Error;

    fn try_from(saved: SavedVegasPdf<T>) -> Result<Self, Error> {
        Self::from_edges(saved.edges)
    }
}

impl<T: Float> VegasPdf<T> {
    /// Constructor for the uniform density with `bins` bins in each of the `dimensions`.
    pub fn new(dimensions: usize, bins: usize) -> Result<Self, Error> {
        if dimensions == 0 {
            return Err(Error::InvalidConfig(
                "a VEGAS grid needs at least one dimension".to_string(),
            ));
        }

        if bins == 0 {
            return Err(Error::InvalidConfig(
                "a VEGAS grid needs at least one bin".to_string(),
            ));
        }

        let edges: Vec<T> = (0..=bins)
            .map(|i| to_float::<T>(i) / to_float(bins))
            .collect();

        Ok(Self {
            edges: vec![edges; dimensions],
        })
    }

    /// Constructor for a grid with the given `edges` for every dimension, e.g. one saved from a
    /// previous run. Every dimension must have the same number of edges, start at zero, end at
    /// one and increase strictly.
    pub fn from_edges(edges: Vec<Vec<T>>) -> Result<Self, Error> {
        let bins = match edges.first() {
            Some(first) if first.len() >= 2 => first.len() - 1,
            _ => return Err(Error::InvalidPdf("the grid has no bins".to_string())),
        };

        for (dim, e) in edges.iter().enumerate() {
            if e.len() != bins + 1 {
                return Err(Error::InvalidPdf(format!(
                    "dimension {} has {} edges instead of {}",
                    dim,
                    e.len(),
                    bins + 1
                )));
            }

            if e[0] != T::zero() || e[bins] != T::one() {
                return Err(Error::InvalidPdf(format!(
                    "dimension {} does not span the unit interval",
                    dim
                )));
            }

            if !strictly_increasing(e) {
                return Err(Error::InvalidPdf(format!(
                    "the edges of dimension {} are not strictly increasing",
                    dim
                )));
            }
        }

        Ok(Self { edges })
    }

    /// Returns the number of bins per dimension.
    pub fn bins(&self) -> usize {
        self.edges[0].len() - 1
    }

    /// Returns the number of dimensions.
    pub fn dimensions(&self) -> usize {
        self.edges.len()
    }

    /// Returns the bin edges of `dimension`.
    pub fn edges(&self, dimension: usize) -> &[T] {
        &self.edges[dimension]
    }

    /// Maps the uniformly distributed `random` numbers onto the point `x` distributed according
    /// to this density, writes the bin of each coordinate into `bins` and returns the weight of
    /// the point, i.e. the inverse of the density at `x`.
    pub fn icdf(&self, random: &[T], x: &mut [T], bins: &mut [usize]) -> T {
        let n = self.bins();
        let n_float: T = to_float(n);
        let mut weight = T::one();

        for (dim, &y) in random.iter().enumerate() {
            let position = y * n_float;
            let bin = position.to_usize().unwrap_or(0).min(n - 1);
            let fraction = position - to_float(bin);

            let low = self.edges[dim][bin];
            let width = self.edges[dim][bin + 1] - low;

            x[dim] = low + fraction * width;
            bins[dim] = bin;
            weight = weight * n_float * width;
        }

        weight
    }

    /// Evaluates the density at `x`. Points outside of the unit hypercube have density zero.
    pub fn density(&self, x: &[T]) -> T {
        let n = self.bins();
        let n_float: T = to_float(n);

        x.iter()
            .zip(&self.edges)
            .fold(T::one(), |density, (&x, edges)| {
                if !(x >= T::zero() && x <= T::one()) {
                    return T::zero();
                }

                let bin = edges.partition_point(|&e| e <= x).max(1).min(n) - 1;
                density / (n_float * (edges[bin + 1] - edges[bin]))
            })
    }

    /// Returns the refined grid. Bins are resized so that the compressed adjustment data is
    /// distributed equally among them: regions where the integrand varies strongly receive
    /// narrower bins. `alpha` controls how aggressively the grid follows the data. A dimension
    /// whose data is degenerate keeps its current edges.
    pub fn refine(&self, adjustment: &VegasAdjustment<T>, alpha: T, smoothing: Smoothing) -> Self {
        let edges = self
            .edges
            .iter()
            .enumerate()
            .map(|(dim, edges)| {
                let data = smoothing.apply(&adjustment.mean_squares(dim));

                match importance(&data, alpha) {
                    Some(importance) => {
                        let refined = rebin(edges, &importance);

                        if strictly_increasing(&refined) {
                            refined
                        } else {
                            warn!(
                                "refining dimension {} collapsed a bin, keeping the old grid",
                                dim
                            );
                            edges.clone()
                        }
                    }
                    None => {
                        debug!("dimension {} gives no information, keeping the old grid", dim);
                        edges.clone()
                    }
                }
            })
            .collect();

        Self { edges }
    }
}

fn strictly_increasing<T: Float>(edges: &[T]) -> bool {
    edges.iter().all(|e| e.is_finite()) && edges.windows(2).all(|w| w[0] < w[1])
}

/// Compresses the smoothed adjustment data, $m_i = ((r_i - 1) / \ln r_i)^\alpha$ with $r_i$
/// the share of bin $i$. Returns `None` if the result would not move any edge.
fn importance<T: Float>(data: &[T], alpha: T) -> Option<Vec<T>> {
    let total = data.iter().fold(T::zero(), |acc, &d| acc + d);

    if !(total > T::zero()) || !total.is_finite() {
        if !data.iter().all(|&d| d == T::zero()) {
            warn!("the adjustment data is not finite, the grid is not refined");
        }

        return None;
    }

    let importance: Vec<_> = data
        .iter()
        .map(|&d| {
            if d <= T::zero() {
                return T::zero();
            }

            let r = d / total;

            if r >= T::one() {
                return T::one();
            }

            let m = ((r - T::one()) / r.ln()).powf(alpha);

            if m.is_finite() {
                m
            } else {
                T::one()
            }
        })
        .collect();

    let sum = importance.iter().fold(T::zero(), |acc, &m| acc + m);
    // bin widths of a grid are only exact up to rounding, and so is the data of a flat integrand
    let tolerance = T::epsilon().sqrt() * importance[0];

    if !(sum > T::zero()) || importance.iter().all(|&m| (m - importance[0]).abs() <= tolerance) {
        return None;
    }

    Some(importance)
}

/// Places the new edges such that every new bin receives the same share of `importance`, which
/// is assumed to be constant within each old bin.
fn rebin<T: Float>(edges: &[T], importance: &[T]) -> Vec<T> {
    let bins = importance.len();
    let sum = importance.iter().fold(T::zero(), |acc, &m| acc + m);
    let per_bin = sum / to_float(bins);

    let mut refined = Vec::with_capacity(bins + 1);
    refined.push(edges[0]);

    let mut k = 0;
    let mut accumulated = T::zero();

    for i in 1..bins {
        let target = per_bin * to_float(i);

        while k < bins - 1 && accumulated + importance[k] < target {
            accumulated = accumulated + importance[k];
            k += 1;
        }

        let fraction = if importance[k] > T::zero() {
            ((target - accumulated) / importance[k])
                .max(T::zero())
                .min(T::one())
        } else {
            T::one()
        };

        refined.push(edges[k] + fraction * (edges[k + 1] - edges[k]));
    }

    refined.push(edges[bins]);

    refined
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn uniform_grid() {
        let pdf = VegasPdf::<f64>::new(2, 4).unwrap();

        assert_eq!(pdf.dimensions(), 2);
        assert_eq!(pdf.bins(), 4);
        assert_eq!(pdf.edges(1), &[0.0, 0.25, 0.5, 0.75, 1.0]);

        assert!(VegasPdf::<f64>::new(0, 4).is_err());
        assert!(VegasPdf::<f64>::new(1, 0).is_err());
    }

    #[test]
    fn from_edges_validates() {
        assert!(VegasPdf::from_edges(vec![vec![0.0, 0.3, 1.0]]).is_ok());
        assert!(VegasPdf::<f64>::from_edges(vec![]).is_err());
        assert!(VegasPdf::from_edges(vec![vec![0.0, 0.3, 0.3, 1.0]]).is_err());
        assert!(VegasPdf::from_edges(vec![vec![0.1, 0.3, 1.0]]).is_err());
        assert!(VegasPdf::from_edges(vec![vec![0.0, 0.3, 1.0], vec![0.0, 1.0]]).is_err());
    }

    #[test]
    fn icdf_and_density_are_inverse() {
        let pdf = VegasPdf::from_edges(vec![vec![0.0, 0.1, 1.0], vec![0.0, 0.5, 1.0]]).unwrap();
        let mut x = [0.0; 2];
        let mut bins = [0; 2];

        let weight = pdf.icdf(&[0.25, 0.75], &mut x, &mut bins);

        assert_eq!(bins, [0, 1]);
        assert_approx_eq!(x[0], 0.05);
        assert_approx_eq!(x[1], 0.75);
        // 2 * 0.1 in the first dimension, 2 * 0.5 in the second
        assert_approx_eq!(weight, 0.2);
        assert_approx_eq!(pdf.density(&x), 1.0 / weight);
        assert_eq!(pdf.density(&[1.5, 0.5]), 0.0);
    }

    #[test]
    fn smoothing() {
        let data = [3.0, 0.0, 3.0, 6.0];

        assert_eq!(Smoothing::None.apply(&data), data.to_vec());
        assert_eq!(Smoothing::Average3.apply(&data), vec![1.5, 2.0, 3.0, 4.5]);
        assert_eq!(
            Smoothing::Weighted161.apply(&data),
            vec![21.0 / 8.0, 6.0 / 8.0, 24.0 / 8.0, 45.0 / 8.0]
        );
        assert_eq!(Smoothing::Average3.apply(&[2.0]), vec![2.0]);
    }

    #[test]
    fn flat_data_does_not_move_the_grid() {
        let pdf = VegasPdf::<f64>::new(1, 8).unwrap();
        let mut adjustment = VegasAdjustment::new(1, 8);

        for bin in 0..8 {
            adjustment.fill(&[bin], 1.0);
            adjustment.fill(&[bin], 1.0);
        }

        assert_eq!(pdf.refine(&adjustment, 1.5, Smoothing::Average3), pdf);
    }

    #[test]
    fn almost_flat_data_does_not_move_the_grid() {
        let pdf = VegasPdf::<f64>::new(1, 100).unwrap();
        let mut adjustment = VegasAdjustment::new(1, 100);

        for bin in 0..100 {
            // the weights n * width of a uniform grid with 100 bins differ by a few ulps
            let edges = pdf.edges(0);
            adjustment.fill(&[bin], 100.0 * (edges[bin + 1] - edges[bin]));
        }

        assert_eq!(pdf.refine(&adjustment, 1.5, Smoothing::Average3), pdf);
        assert_eq!(pdf.refine(&adjustment, 0.5, Smoothing::None), pdf);
    }

    #[test]
    fn saved_grids_are_validated() {
        let pdf = VegasPdf::from_edges(vec![vec![0.0, 0.2, 1.0], vec![0.0, 0.5, 1.0]]).unwrap();
        let json = serde_json::to_string(&pdf).unwrap();

        assert_eq!(serde_json::from_str::<VegasPdf<f64>>(&json).unwrap(), pdf);

        for json in &[
            r#"{"edges":[[0.0,0.5,1.0],[0.0,1.0]]}"#,
            r#"{"edges":[[0.0,0.7,0.5,1.0]]}"#,
            r#"{"edges":[[0.0,0.5,0.9]]}"#,
            r#"{"edges":[]}"#,
        ] {
            assert!(serde_json::from_str::<VegasPdf<f64>>(json).is_err());
        }
    }

    #[test]
    fn empty_data_does_not_move_the_grid() {
        let pdf = VegasPdf::<f64>::new(3, 8).unwrap();
        let adjustment = VegasAdjustment::new(3, 8);

        assert_eq!(pdf.refine(&adjustment, 1.5, Smoothing::Weighted161), pdf);
    }

    #[test]
    fn refinement_narrows_bins_with_large_contributions() {
        let pdf = VegasPdf::<f64>::new(1, 4).unwrap();
        let mut adjustment = VegasAdjustment::new(1, 4);

        adjustment.fill(&[0], 10.0);
        adjustment.fill(&[1], 1.0);
        adjustment.fill(&[2], 1.0);
        adjustment.fill(&[3], 1.0);

        let refined = pdf.refine(&adjustment, 1.5, Smoothing::None);
        let edges = refined.edges(0);

        assert_eq!(edges[0], 0.0);
        assert_eq!(edges[4], 1.0);
        assert!(edges.windows(2).all(|w| w[0] < w[1]));
        // the first bin is split
        assert!(edges[1] < 0.25);
        assert!(edges[2] < 0.25);
    }

    #[test]
    fn refinement_keeps_edges_increasing() {
        let data = [0.0, 0.0, 1e-300, 1e300, 5.0, 0.0, 0.0, 1.0];

        for &alpha in &[0.1, 0.5, 1.5, 4.0, 20.0] {
            for &smoothing in &[Smoothing::Average3, Smoothing::Weighted161, Smoothing::None] {
                let pdf = VegasPdf::<f64>::new(1, data.len()).unwrap();
                let mut adjustment = VegasAdjustment::new(1, data.len());

                for (bin, &d) in data.iter().enumerate() {
                    adjustment.fill(&[bin], d.sqrt());
                }

                let refined = pdf.refine(&adjustment, alpha, smoothing);
                assert!(strictly_increasing(refined.edges(0)));
                assert!(VegasPdf::from_edges(vec![refined.edges(0).to_vec()]).is_ok());
            }
        }
    }
}
