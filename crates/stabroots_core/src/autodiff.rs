use crate::traits::ConstraintSystem;
use nalgebra::DMatrix;
use num_traits::{Float, FromPrimitive, Num, NumCast, One, ToPrimitive, Zero};
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

/// Simple Dual Number for Forward Mode AD
/// val: real part
/// eps: infinitesimal part
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual {
    pub val: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(val: f64, eps: f64) -> Self {
        Self { val, eps }
    }

    /// Applies a scalar function with value `f` and derivative `df` at `self.val`.
    fn chain(self, f: f64, df: f64) -> Self {
        Self::new(f, df * self.eps)
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::new(0.0, 0.0)
    }
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.eps == 0.0
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::new(1.0, 0.0)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.val * rhs.eps + self.eps * rhs.val)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let denom = rhs.val * rhs.val;
        Self::new(
            self.val / rhs.val,
            (self.eps * rhs.val - self.val * rhs.eps) / denom,
        )
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

impl Rem for Dual {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        // d(a % b) = da away from the jumps.
        Self::new(self.val % rhs.val, self.eps)
    }
}

impl AddAssign for Dual {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
impl SubAssign for Dual {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}
impl MulAssign for Dual {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}
impl DivAssign for Dual {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}
impl RemAssign for Dual {
    fn rem_assign(&mut self, rhs: Self) {
        *self = *self % rhs;
    }
}

impl Num for Dual {
    type FromStrRadixErr = ();
    fn from_str_radix(str: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        f64::from_str_radix(str, radix)
            .map(|v| Self::new(v, 0.0))
            .map_err(|_| ())
    }
}

impl ToPrimitive for Dual {
    fn to_i64(&self) -> Option<i64> {
        self.val.to_i64()
    }
    fn to_u64(&self) -> Option<u64> {
        self.val.to_u64()
    }
    fn to_f64(&self) -> Option<f64> {
        Some(self.val)
    }
}

impl FromPrimitive for Dual {
    fn from_i64(n: i64) -> Option<Self> {
        Some(Self::new(n as f64, 0.0))
    }
    fn from_u64(n: u64) -> Option<Self> {
        Some(Self::new(n as f64, 0.0))
    }
    fn from_f64(n: f64) -> Option<Self> {
        Some(Self::new(n, 0.0))
    }
}

impl NumCast for Dual {
    fn from<T: ToPrimitive>(n: T) -> Option<Self> {
        n.to_f64().map(|v| Self::new(v, 0.0))
    }
}

impl Float for Dual {
    fn nan() -> Self {
        Self::new(f64::NAN, 0.0)
    }
    fn infinity() -> Self {
        Self::new(f64::INFINITY, 0.0)
    }
    fn neg_infinity() -> Self {
        Self::new(f64::NEG_INFINITY, 0.0)
    }
    fn neg_zero() -> Self {
        Self::new(-0.0, -0.0)
    }
    fn min_value() -> Self {
        Self::new(f64::MIN, 0.0)
    }
    fn min_positive_value() -> Self {
        Self::new(f64::MIN_POSITIVE, 0.0)
    }
    fn max_value() -> Self {
        Self::new(f64::MAX, 0.0)
    }
    fn is_nan(self) -> bool {
        self.val.is_nan()
    }
    fn is_infinite(self) -> bool {
        self.val.is_infinite()
    }
    fn is_finite(self) -> bool {
        self.val.is_finite()
    }
    fn is_normal(self) -> bool {
        self.val.is_normal()
    }
    fn classify(self) -> std::num::FpCategory {
        self.val.classify()
    }
    fn floor(self) -> Self {
        Self::new(self.val.floor(), 0.0)
    }
    fn ceil(self) -> Self {
        Self::new(self.val.ceil(), 0.0)
    }
    fn round(self) -> Self {
        Self::new(self.val.round(), 0.0)
    }
    fn trunc(self) -> Self {
        Self::new(self.val.trunc(), 0.0)
    }
    fn fract(self) -> Self {
        Self::new(self.val.fract(), self.eps)
    }
    fn abs(self) -> Self {
        Self::new(
            self.val.abs(),
            if self.val >= 0.0 { self.eps } else { -self.eps },
        )
    }
    fn signum(self) -> Self {
        Self::new(self.val.signum(), 0.0)
    }
    fn is_sign_positive(self) -> bool {
        self.val.is_sign_positive()
    }
    fn is_sign_negative(self) -> bool {
        self.val.is_sign_negative()
    }
    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }
    fn recip(self) -> Self {
        Self::one() / self
    }

    fn powi(self, n: i32) -> Self {
        let val_pow = self.val.powi(n);
        Self::new(val_pow, (n as f64) * self.val.powi(n - 1) * self.eps)
    }

    fn powf(self, n: Self) -> Self {
        // x^y = exp(y * ln(x))
        let val_pow = self.val.powf(n.val);
        let eps_new = val_pow * (n.eps * self.val.ln() + n.val * self.eps / self.val);
        Self::new(val_pow, eps_new)
    }

    fn sqrt(self) -> Self {
        let s = self.val.sqrt();
        Self::new(s, self.eps / (2.0 * s))
    }

    fn exp(self) -> Self {
        let e = self.val.exp();
        Self::new(e, e * self.eps)
    }

    fn exp2(self) -> Self {
        let e = self.val.exp2();
        self.chain(e, e * std::f64::consts::LN_2)
    }
    fn ln(self) -> Self {
        Self::new(self.val.ln(), self.eps / self.val)
    }
    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }
    fn log2(self) -> Self {
        self.chain(self.val.log2(), 1.0 / (self.val * std::f64::consts::LN_2))
    }
    fn log10(self) -> Self {
        self.chain(self.val.log10(), 1.0 / (self.val * std::f64::consts::LN_10))
    }

    fn max(self, other: Self) -> Self {
        if self.val > other.val {
            self
        } else {
            other
        }
    }
    fn min(self, other: Self) -> Self {
        if self.val < other.val {
            self
        } else {
            other
        }
    }

    fn abs_sub(self, other: Self) -> Self {
        if self.val > other.val {
            self - other
        } else {
            Self::zero()
        }
    }

    fn cbrt(self) -> Self {
        let c = self.val.cbrt();
        self.chain(c, 1.0 / (3.0 * c * c))
    }

    /// Modulus of `(self, other)`; this is what `Complex::norm` calls.
    fn hypot(self, other: Self) -> Self {
        let h = self.val.hypot(other.val);
        Self::new(h, (self.val * self.eps + other.val * other.eps) / h)
    }

    fn sin(self) -> Self {
        Self::new(self.val.sin(), self.eps * self.val.cos())
    }
    fn cos(self) -> Self {
        Self::new(self.val.cos(), -self.eps * self.val.sin())
    }
    fn tan(self) -> Self {
        let t = self.val.tan();
        Self::new(t, self.eps * (1.0 + t * t))
    }
    fn asin(self) -> Self {
        self.chain(self.val.asin(), 1.0 / (1.0 - self.val * self.val).sqrt())
    }
    fn acos(self) -> Self {
        self.chain(self.val.acos(), -1.0 / (1.0 - self.val * self.val).sqrt())
    }
    fn atan(self) -> Self {
        self.chain(self.val.atan(), 1.0 / (1.0 + self.val * self.val))
    }
    fn atan2(self, other: Self) -> Self {
        let denom = self.val * self.val + other.val * other.val;
        Self::new(
            self.val.atan2(other.val),
            (other.val * self.eps - self.val * other.eps) / denom,
        )
    }
    fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }

    fn exp_m1(self) -> Self {
        self.chain(self.val.exp_m1(), self.val.exp())
    }
    fn ln_1p(self) -> Self {
        self.chain(self.val.ln_1p(), 1.0 / (1.0 + self.val))
    }
    fn sinh(self) -> Self {
        self.chain(self.val.sinh(), self.val.cosh())
    }
    fn cosh(self) -> Self {
        self.chain(self.val.cosh(), self.val.sinh())
    }
    fn tanh(self) -> Self {
        let t = self.val.tanh();
        self.chain(t, 1.0 - t * t)
    }
    fn asinh(self) -> Self {
        self.chain(self.val.asinh(), 1.0 / (self.val * self.val + 1.0).sqrt())
    }
    fn acosh(self) -> Self {
        self.chain(self.val.acosh(), 1.0 / (self.val * self.val - 1.0).sqrt())
    }
    fn atanh(self) -> Self {
        self.chain(self.val.atanh(), 1.0 / (1.0 - self.val * self.val))
    }

    fn integer_decode(self) -> (u64, i16, i8) {
        self.val.integer_decode()
    }
}

/// Hyper-dual number for exact second derivatives.
/// val: real part
/// e1, e2: independent infinitesimal parts (e1² = e2² = 0)
/// e12: mixed part, carries d²f / (dx_j dx_k) when x_j is seeded on e1 and x_k on e2
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct HyperDual {
    pub val: f64,
    pub e1: f64,
    pub e2: f64,
    pub e12: f64,
}

impl HyperDual {
    pub fn new(val: f64, e1: f64, e2: f64, e12: f64) -> Self {
        Self { val, e1, e2, e12 }
    }

    pub fn constant(val: f64) -> Self {
        Self::new(val, 0.0, 0.0, 0.0)
    }

    /// Applies a scalar function with value `f`, first derivative `df`
    /// and second derivative `ddf` at `self.val`.
    fn chain(self, f: f64, df: f64, ddf: f64) -> Self {
        Self::new(
            f,
            df * self.e1,
            df * self.e2,
            df * self.e12 + ddf * self.e1 * self.e2,
        )
    }
}

impl Zero for HyperDual {
    fn zero() -> Self {
        Self::constant(0.0)
    }
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.e1 == 0.0 && self.e2 == 0.0 && self.e12 == 0.0
    }
}

impl One for HyperDual {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl Add for HyperDual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.val + rhs.val,
            self.e1 + rhs.e1,
            self.e2 + rhs.e2,
            self.e12 + rhs.e12,
        )
    }
}

impl Sub for HyperDual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(
            self.val - rhs.val,
            self.e1 - rhs.e1,
            self.e2 - rhs.e2,
            self.e12 - rhs.e12,
        )
    }
}

impl Mul for HyperDual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.val * rhs.val,
            self.val * rhs.e1 + self.e1 * rhs.val,
            self.val * rhs.e2 + self.e2 * rhs.val,
            self.val * rhs.e12 + self.e1 * rhs.e2 + self.e2 * rhs.e1 + self.e12 * rhs.val,
        )
    }
}

impl Div for HyperDual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let mut out = self * rhs.recip();
        out.val = self.val / rhs.val;
        out
    }
}

impl Neg for HyperDual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.e1, -self.e2, -self.e12)
    }
}

impl Rem for HyperDual {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        Self::new(self.val % rhs.val, self.e1, self.e2, self.e12)
    }
}

impl AddAssign for HyperDual {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
impl SubAssign for HyperDual {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}
impl MulAssign for HyperDual {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}
impl DivAssign for HyperDual {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}
impl RemAssign for HyperDual {
    fn rem_assign(&mut self, rhs: Self) {
        *self = *self % rhs;
    }
}

impl Num for HyperDual {
    type FromStrRadixErr = ();
    fn from_str_radix(str: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        f64::from_str_radix(str, radix)
            .map(Self::constant)
            .map_err(|_| ())
    }
}

impl ToPrimitive for HyperDual {
    fn to_i64(&self) -> Option<i64> {
        self.val.to_i64()
    }
    fn to_u64(&self) -> Option<u64> {
        self.val.to_u64()
    }
    fn to_f64(&self) -> Option<f64> {
        Some(self.val)
    }
}

impl FromPrimitive for HyperDual {
    fn from_i64(n: i64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_u64(n: u64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_f64(n: f64) -> Option<Self> {
        Some(Self::constant(n))
    }
}

impl NumCast for HyperDual {
    fn from<T: ToPrimitive>(n: T) -> Option<Self> {
        n.to_f64().map(Self::constant)
    }
}

impl Float for HyperDual {
    fn nan() -> Self {
        Self::constant(f64::NAN)
    }
    fn infinity() -> Self {
        Self::constant(f64::INFINITY)
    }
    fn neg_infinity() -> Self {
        Self::constant(f64::NEG_INFINITY)
    }
    fn neg_zero() -> Self {
        Self::new(-0.0, -0.0, -0.0, -0.0)
    }
    fn min_value() -> Self {
        Self::constant(f64::MIN)
    }
    fn min_positive_value() -> Self {
        Self::constant(f64::MIN_POSITIVE)
    }
    fn max_value() -> Self {
        Self::constant(f64::MAX)
    }
    fn is_nan(self) -> bool {
        self.val.is_nan()
    }
    fn is_infinite(self) -> bool {
        self.val.is_infinite()
    }
    fn is_finite(self) -> bool {
        self.val.is_finite()
    }
    fn is_normal(self) -> bool {
        self.val.is_normal()
    }
    fn classify(self) -> std::num::FpCategory {
        self.val.classify()
    }
    fn floor(self) -> Self {
        Self::constant(self.val.floor())
    }
    fn ceil(self) -> Self {
        Self::constant(self.val.ceil())
    }
    fn round(self) -> Self {
        Self::constant(self.val.round())
    }
    fn trunc(self) -> Self {
        Self::constant(self.val.trunc())
    }
    fn fract(self) -> Self {
        Self::new(self.val.fract(), self.e1, self.e2, self.e12)
    }
    fn abs(self) -> Self {
        if self.val >= 0.0 {
            self
        } else {
            -self
        }
    }
    fn signum(self) -> Self {
        Self::constant(self.val.signum())
    }
    fn is_sign_positive(self) -> bool {
        self.val.is_sign_positive()
    }
    fn is_sign_negative(self) -> bool {
        self.val.is_sign_negative()
    }
    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }
    fn recip(self) -> Self {
        let inv = 1.0 / self.val;
        self.chain(inv, -inv * inv, 2.0 * inv * inv * inv)
    }

    fn powi(self, n: i32) -> Self {
        let nf = n as f64;
        self.chain(
            self.val.powi(n),
            nf * self.val.powi(n - 1),
            nf * (nf - 1.0) * self.val.powi(n - 2),
        )
    }

    fn powf(self, n: Self) -> Self {
        let mut out = (n * self.ln()).exp();
        out.val = self.val.powf(n.val);
        out
    }

    fn sqrt(self) -> Self {
        let s = self.val.sqrt();
        self.chain(s, 0.5 / s, -0.25 / (s * self.val))
    }

    fn exp(self) -> Self {
        let e = self.val.exp();
        self.chain(e, e, e)
    }

    fn exp2(self) -> Self {
        let e = self.val.exp2();
        let ln2 = std::f64::consts::LN_2;
        self.chain(e, e * ln2, e * ln2 * ln2)
    }
    fn ln(self) -> Self {
        let inv = 1.0 / self.val;
        self.chain(self.val.ln(), inv, -inv * inv)
    }
    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }
    fn log2(self) -> Self {
        let mut out = self.ln() / Self::constant(std::f64::consts::LN_2);
        out.val = self.val.log2();
        out
    }
    fn log10(self) -> Self {
        let mut out = self.ln() / Self::constant(std::f64::consts::LN_10);
        out.val = self.val.log10();
        out
    }

    fn max(self, other: Self) -> Self {
        if self.val > other.val {
            self
        } else {
            other
        }
    }
    fn min(self, other: Self) -> Self {
        if self.val < other.val {
            self
        } else {
            other
        }
    }

    fn abs_sub(self, other: Self) -> Self {
        if self.val > other.val {
            self - other
        } else {
            Self::zero()
        }
    }

    fn cbrt(self) -> Self {
        let c = self.val.cbrt();
        self.chain(c, 1.0 / (3.0 * c * c), -2.0 / (9.0 * c * c * c * c * c))
    }

    /// Modulus of `(self, other)`; this is what `Complex::norm` calls.
    fn hypot(self, other: Self) -> Self {
        let mut out = (self * self + other * other).sqrt();
        out.val = self.val.hypot(other.val);
        out
    }

    fn sin(self) -> Self {
        let (s, c) = self.val.sin_cos();
        self.chain(s, c, -s)
    }
    fn cos(self) -> Self {
        let (s, c) = self.val.sin_cos();
        self.chain(c, -s, -c)
    }
    fn tan(self) -> Self {
        let t = self.val.tan();
        let d = 1.0 + t * t;
        self.chain(t, d, 2.0 * t * d)
    }
    fn asin(self) -> Self {
        let q = 1.0 - self.val * self.val;
        self.chain(self.val.asin(), 1.0 / q.sqrt(), self.val / (q * q.sqrt()))
    }
    fn acos(self) -> Self {
        let q = 1.0 - self.val * self.val;
        self.chain(self.val.acos(), -1.0 / q.sqrt(), -self.val / (q * q.sqrt()))
    }
    fn atan(self) -> Self {
        let q = 1.0 + self.val * self.val;
        self.chain(self.val.atan(), 1.0 / q, -2.0 * self.val / (q * q))
    }
    fn atan2(self, other: Self) -> Self {
        let mut out = (self / other).atan();
        out.val = self.val.atan2(other.val);
        out
    }
    fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }

    fn exp_m1(self) -> Self {
        let e = self.val.exp();
        self.chain(self.val.exp_m1(), e, e)
    }
    fn ln_1p(self) -> Self {
        let inv = 1.0 / (1.0 + self.val);
        self.chain(self.val.ln_1p(), inv, -inv * inv)
    }
    fn sinh(self) -> Self {
        let (s, c) = (self.val.sinh(), self.val.cosh());
        self.chain(s, c, s)
    }
    fn cosh(self) -> Self {
        let (s, c) = (self.val.sinh(), self.val.cosh());
        self.chain(c, s, c)
    }
    fn tanh(self) -> Self {
        let t = self.val.tanh();
        let d = 1.0 - t * t;
        self.chain(t, d, -2.0 * t * d)
    }
    fn asinh(self) -> Self {
        let q = self.val * self.val + 1.0;
        self.chain(self.val.asinh(), 1.0 / q.sqrt(), -self.val / (q * q.sqrt()))
    }
    fn acosh(self) -> Self {
        let q = self.val * self.val - 1.0;
        self.chain(self.val.acosh(), 1.0 / q.sqrt(), -self.val / (q * q.sqrt()))
    }
    fn atanh(self) -> Self {
        let q = 1.0 - self.val * self.val;
        self.chain(self.val.atanh(), 1.0 / q, 2.0 * self.val / (q * q))
    }

    fn integer_decode(self) -> (u64, i16, i8) {
        self.val.integer_decode()
    }
}

// --- Derivative assembly ---

/// Gradient of a scalar function written generically over `Scalar`.
pub fn gradient<F>(x: &[f64], f: F) -> Vec<f64>
where
    F: Fn(&[Dual]) -> Dual,
{
    let n = x.len();
    let mut dual_x: Vec<Dual> = x.iter().map(|&v| Dual::new(v, 0.0)).collect();
    let mut grad = vec![0.0; n];
    for j in 0..n {
        dual_x[j].eps = 1.0;
        grad[j] = f(&dual_x).eps;
        dual_x[j].eps = 0.0;
    }
    grad
}

/// Dense Hessian of a scalar function written generically over `Scalar`.
pub fn hessian<F>(x: &[f64], f: F) -> DMatrix<f64>
where
    F: Fn(&[HyperDual]) -> HyperDual,
{
    let n = x.len();
    let mut hess = DMatrix::zeros(n, n);
    for j in 0..n {
        for k in 0..=j {
            let seeded = seed_pair(x, j, k);
            let value = f(&seeded).e12;
            hess[(j, k)] = value;
            hess[(k, j)] = value;
        }
    }
    hess
}

/// Seeds `x_j` on e1 and `x_k` on e2.
fn seed_pair(x: &[f64], j: usize, k: usize) -> Vec<HyperDual> {
    x.iter()
        .enumerate()
        .map(|(l, &v)| {
            HyperDual::new(
                v,
                if l == j { 1.0 } else { 0.0 },
                if l == k { 1.0 } else { 0.0 },
                0.0,
            )
        })
        .collect()
}

// --- Constraint Derivatives Wrapper ---

/// Evaluates a constraint system together with its exact derivatives.
///
/// The wrapped system is instantiated three times: with `f64` for values,
/// `Dual` for Jacobian columns and `HyperDual` for Hessian entries.
pub struct ConstraintDerivatives<'a, S> {
    pub inner: &'a S,
}

impl<'a, S> ConstraintDerivatives<'a, S>
where
    S: ConstraintSystem<f64> + ConstraintSystem<Dual> + ConstraintSystem<HyperDual>,
{
    pub fn new(inner: &'a S) -> Self {
        Self { inner }
    }

    fn dims(&self) -> (usize, usize) {
        (
            <S as ConstraintSystem<f64>>::num_constraints(self.inner),
            <S as ConstraintSystem<f64>>::num_variables(self.inner),
        )
    }

    pub fn values(&self, x: &[f64]) -> Vec<f64> {
        let (m, _) = self.dims();
        let mut out = vec![0.0; m];
        self.inner.apply(x, out.as_mut_slice());
        out
    }

    /// Dense `m x n` Jacobian, one dual evaluation per column.
    pub fn jacobian(&self, x: &[f64]) -> DMatrix<f64> {
        let (m, n) = self.dims();
        let mut jacobian = DMatrix::zeros(m, n);
        let mut dual_x: Vec<Dual> = x.iter().map(|&v| Dual::new(v, 0.0)).collect();
        let mut dual_out = vec![Dual::new(0.0, 0.0); m];

        for j in 0..n {
            // Prepare input: x with perturbation in j-th component
            dual_x[j].eps = 1.0;
            self.inner.apply(dual_x.as_slice(), dual_out.as_mut_slice());
            dual_x[j].eps = 0.0;

            for i in 0..m {
                jacobian[(i, j)] = dual_out[i].eps;
            }
        }
        jacobian
    }

    /// Dense `n x n` Hessian of `sum_i weights[i] * g_i(x)`.
    ///
    /// Each constraint is differentiated on its own through `apply_single`, so
    /// entries with a zero weight cost nothing.
    pub fn weighted_hessian(&self, x: &[f64], weights: &[f64]) -> DMatrix<f64> {
        let (m, n) = self.dims();
        let mut hess = DMatrix::zeros(n, n);
        for j in 0..n {
            for k in 0..=j {
                let seeded = seed_pair(x, j, k);
                let mut sum = 0.0;
                for (i, &w) in weights.iter().enumerate().take(m) {
                    if w == 0.0 {
                        continue;
                    }
                    sum += w * self.inner.apply_single(seeded.as_slice(), i).e12;
                }
                hess[(j, k)] = sum;
                hess[(k, j)] = sum;
            }
        }
        hess
    }
}
