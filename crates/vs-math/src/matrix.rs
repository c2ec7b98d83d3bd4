//! Dense matrices over expressions

use crate::error::{MathError, MathResult};
use crate::expr::Expr;
use crate::number::Number;
use crate::poly::expand;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest order handled by cofactor expansion
const MAX_SYMBOLIC_ORDER: usize = 6;

/// Row-major matrix of expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<Expr>,
}

impl Matrix {
    /// Build from row-major entries
    pub fn new(rows: usize, cols: usize, data: Vec<Expr>) -> MathResult<Self> {
        if rows == 0 || cols == 0 || data.len() != rows * cols {
            return Err(MathError::Shape(format!(
                "{} entries do not form a {rows}x{cols} matrix",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from nested rows, which must all have the same length
    pub fn from_rows(rows: Vec<Vec<Expr>>) -> MathResult<Self> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != width) {
            return Err(MathError::Shape("rows have different lengths".into()));
        }
        Self::new(height, width, rows.into_iter().flatten().collect())
    }

    /// `n x n` identity
    pub fn identity(n: usize) -> MathResult<Self> {
        let data = (0..n * n)
            .map(|i| if i / n == i % n { Expr::one() } else { Expr::zero() })
            .collect();
        Self::new(n, n, data)
    }

    /// Entries in row-major order
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[Expr] {
        &self.data
    }

    /// Row count
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Column count
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[must_use]
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Entry at `(row, col)`
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<&Expr> {
        (row < self.rows && col < self.cols).then(|| &self.data[row * self.cols + col])
    }

    /// One row as a slice
    #[must_use]
    pub fn row(&self, row: usize) -> Option<&[Expr]> {
        (row < self.rows).then(|| &self.data[row * self.cols..(row + 1) * self.cols])
    }

    /// Entries as nested rows
    #[must_use]
    pub fn to_rows(&self) -> Vec<Vec<Expr>> {
        self.data.chunks(self.cols).map(<[Expr]>::to_vec).collect()
    }

    /// Apply `f` to every entry
    pub fn map(&self, f: impl Fn(&Expr) -> MathResult<Expr>) -> MathResult<Self> {
        Ok(Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(f).collect::<MathResult<Vec<_>>>()?,
        })
    }

    fn same_shape(&self, other: &Self, op: &str) -> MathResult<()> {
        if self.rows == other.rows && self.cols == other.cols {
            Ok(())
        } else {
            Err(MathError::Shape(format!(
                "cannot {op} {}x{} and {}x{} matrices",
                self.rows, self.cols, other.rows, other.cols
            )))
        }
    }

    /// Entrywise sum
    pub fn add(&self, other: &Self) -> MathResult<Self> {
        self.same_shape(other, "add")?;
        let data = self.data.iter().zip(&other.data).map(|(a, b)| a.add(b)).collect();
        Self::new(self.rows, self.cols, data)
    }

    /// Entrywise difference
    pub fn sub(&self, other: &Self) -> MathResult<Self> {
        self.same_shape(other, "subtract")?;
        let data = self.data.iter().zip(&other.data).map(|(a, b)| a.sub(b)).collect();
        Self::new(self.rows, self.cols, data)
    }

    /// Multiply every entry by a scalar
    pub fn scale(&self, factor: &Expr) -> MathResult<Self> {
        self.map(|e| factor.mul(e))
    }

    /// Matrix product
    pub fn matmul(&self, other: &Self) -> MathResult<Self> {
        if self.cols != other.rows {
            return Err(MathError::Shape(format!(
                "cannot multiply {}x{} by {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut data = Vec::with_capacity(self.rows * other.cols);
        for i in 0..self.rows {
            for j in 0..other.cols {
                let terms = (0..self.cols)
                    .map(|k| self.data[i * self.cols + k].mul(&other.data[k * other.cols + j]))
                    .collect::<MathResult<Vec<_>>>()?;
                data.push(Expr::sum(terms));
            }
        }
        Self::new(self.rows, other.cols, data)
    }

    #[must_use]
    pub fn transpose(&self) -> Self {
        let mut data = Vec::with_capacity(self.data.len());
        for j in 0..self.cols {
            for i in 0..self.rows {
                data.push(self.data[i * self.cols + j].clone());
            }
        }
        Self {
            rows: self.cols,
            cols: self.rows,
            data,
        }
    }

    fn numeric_entries(&self) -> Option<Vec<Number>> {
        self.data.iter().map(|e| e.as_number().cloned()).collect()
    }

    fn require_square(&self, op: &str) -> MathResult<()> {
        if self.is_square() {
            Ok(())
        } else {
            Err(MathError::Shape(format!(
                "{op} needs a square matrix, got {}x{}",
                self.rows, self.cols
            )))
        }
    }

    /// Determinant
    pub fn det(&self) -> MathResult<Expr> {
        self.require_square("determinant")?;
        if let Some(entries) = self.numeric_entries() {
            return Ok(Expr::Num(numeric_det(entries, self.rows)?));
        }
        if self.rows > MAX_SYMBOLIC_ORDER {
            return Err(MathError::Unsupported(format!(
                "symbolic determinant of order {}",
                self.rows
            )));
        }
        expand(&cofactor_det(&self.to_rows())?)
    }

    /// Inverse; singular matrices are a domain error
    pub fn inverse(&self) -> MathResult<Self> {
        self.require_square("inverse")?;
        let n = self.rows;
        if let Some(entries) = self.numeric_entries() {
            let inverse = numeric_inverse(entries, n)?;
            return Self::new(n, n, inverse.into_iter().map(Expr::Num).collect());
        }
        if n > MAX_SYMBOLIC_ORDER {
            return Err(MathError::Unsupported(format!("symbolic inverse of order {n}")));
        }
        let det = self.det()?;
        if det.is_zero() {
            return Err(MathError::Domain("matrix is singular".into()));
        }
        let rows = self.to_rows();
        let mut data = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                // adjugate is the transposed cofactor matrix
                let cofactor = cofactor_det(&minor(&rows, j, i))?;
                let signed = if (i + j) % 2 == 0 { cofactor } else { cofactor.neg() };
                data.push(expand(&signed.div(&det)?)?);
            }
        }
        Self::new(n, n, data)
    }
}

fn minor(rows: &[Vec<Expr>], skip_row: usize, skip_col: usize) -> Vec<Vec<Expr>> {
    rows.iter()
        .enumerate()
        .filter(|(i, _)| *i != skip_row)
        .map(|(_, row)| {
            row.iter()
                .enumerate()
                .filter(|(j, _)| *j != skip_col)
                .map(|(_, e)| e.clone())
                .collect()
        })
        .collect()
}

fn cofactor_det(rows: &[Vec<Expr>]) -> MathResult<Expr> {
    match rows.len() {
        0 => Ok(Expr::one()),
        1 => Ok(rows[0][0].clone()),
        2 => Ok(rows[0][0].mul(&rows[1][1])?.sub(&rows[0][1].mul(&rows[1][0])?)),
        _ => {
            let mut terms = Vec::with_capacity(rows.len());
            for (j, entry) in rows[0].iter().enumerate() {
                if entry.is_zero() {
                    continue;
                }
                let term = entry.mul(&cofactor_det(&minor(rows, 0, j))?)?;
                terms.push(if j % 2 == 0 { term } else { term.neg() });
            }
            Ok(Expr::sum(terms))
        }
    }
}

fn negligible(n: &Number) -> bool {
    match n {
        Number::Float(f) => f.abs() < 1e-300,
        other => other.is_zero(),
    }
}

fn numeric_det(mut a: Vec<Number>, n: usize) -> MathResult<Number> {
    let mut det = a[0].one_like();
    for col in 0..n {
        let Some(pivot) = (col..n).find(|r| !negligible(&a[r * n + col])) else {
            return Ok(det.zero_like());
        };
        if pivot != col {
            for k in 0..n {
                a.swap(col * n + k, pivot * n + k);
            }
            det = det.neg();
        }
        let p = a[col * n + col].clone();
        det = det.mul(&p);
        for r in col + 1..n {
            let factor = a[r * n + col].div(&p)?;
            if factor.is_zero() {
                continue;
            }
            for k in col..n {
                let delta = factor.mul(&a[col * n + k]);
                a[r * n + k] = a[r * n + k].sub(&delta);
            }
        }
    }
    Ok(det)
}

fn numeric_inverse(mut a: Vec<Number>, n: usize) -> MathResult<Vec<Number>> {
    let one = a[0].one_like();
    let mut inv: Vec<Number> = (0..n * n)
        .map(|i| if i / n == i % n { one.clone() } else { one.zero_like() })
        .collect();
    for col in 0..n {
        let pivot = (col..n)
            .find(|r| !negligible(&a[r * n + col]))
            .ok_or_else(|| MathError::Domain("matrix is singular".into()))?;
        if pivot != col {
            for k in 0..n {
                a.swap(col * n + k, pivot * n + k);
                inv.swap(col * n + k, pivot * n + k);
            }
        }
        let p = a[col * n + col].clone();
        for k in 0..n {
            a[col * n + k] = a[col * n + k].div(&p)?;
            inv[col * n + k] = inv[col * n + k].div(&p)?;
        }
        for r in 0..n {
            if r == col {
                continue;
            }
            let factor = a[r * n + col].clone();
            if factor.is_zero() {
                continue;
            }
            for k in 0..n {
                let da = factor.mul(&a[col * n + k]);
                a[r * n + k] = a[r * n + k].sub(&da);
                let di = factor.mul(&inv[col * n + k]);
                inv[r * n + k] = inv[r * n + k].sub(&di);
            }
        }
    }
    Ok(inv)
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Matrix([")?;
        for (i, row) in self.data.chunks(self.cols).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[")?;
            for (j, entry) in row.iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{entry}")?;
            }
            write!(f, "]")?;
        }
        write!(f, "])")
    }
}

impl Matrix {
    /// LaTeX rendering as a bracketed array
    #[must_use]
    pub fn to_latex(&self) -> String {
        let body: Vec<String> = self
            .data
            .chunks(self.cols)
            .map(|row| row.iter().map(Expr::to_latex).collect::<Vec<_>>().join(" & "))
            .collect();
        format!("\\left[\\begin{{matrix}}{}\\end{{matrix}}\\right]", body.join("\\\\"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ints(rows: &[&[i64]]) -> Matrix {
        Matrix::from_rows(
            rows.iter()
                .map(|r| r.iter().map(|v| Expr::int(*v)).collect())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_shape_errors() {
        assert!(Matrix::new(2, 2, vec![Expr::one()]).is_err());
        let a = ints(&[&[1, 2]]);
        let b = ints(&[&[1], &[2], &[3]]);
        assert!(matches!(a.matmul(&b), Err(MathError::Shape(_))));
    }

    #[test]
    fn test_matmul_and_transpose() {
        let a = ints(&[&[1, 2], &[3, 4]]);
        let b = ints(&[&[0, 1], &[1, 0]]);
        assert_eq!(a.matmul(&b).unwrap(), ints(&[&[2, 1], &[4, 3]]));
        assert_eq!(a.transpose(), ints(&[&[1, 3], &[2, 4]]));
    }

    #[test]
    fn test_numeric_det_and_inverse() {
        let a = ints(&[&[1, 2], &[3, 4]]);
        assert_eq!(a.det().unwrap(), Expr::int(-2));
        let inv = a.inverse().unwrap();
        assert_eq!(a.matmul(&inv).unwrap(), Matrix::identity(2).unwrap());
        assert_eq!(inv.get(1, 0), Some(&Expr::rational(3, 2).unwrap()));
    }

    #[test]
    fn test_singular_inverse() {
        let a = ints(&[&[1, 2], &[2, 4]]);
        assert_eq!(a.det().unwrap(), Expr::zero());
        assert!(matches!(a.inverse(), Err(MathError::Domain(_))));
    }

    #[test]
    fn test_symbolic_det() {
        let x = Expr::symbol("x");
        let a = Matrix::from_rows(vec![
            vec![x.clone(), Expr::one()],
            vec![Expr::one(), x.clone()],
        ])
        .unwrap();
        let expected = x.pow(&Expr::int(2)).unwrap().sub(&Expr::one());
        assert_eq!(a.det().unwrap(), expected);
    }

    #[test]
    fn test_display() {
        let a = ints(&[&[1, 2], &[3, 4]]);
        assert_eq!(a.to_string(), "Matrix([[1, 2], [3, 4]])");
        assert_eq!(
            a.to_latex(),
            "\\left[\\begin{matrix}1 & 2\\\\3 & 4\\end{matrix}\\right]"
        );
    }
}
