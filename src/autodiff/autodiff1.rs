use std::{
	fmt::{self, Display},
	ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign},
};

use super::Scalar;
use crate::prelude::*;
use nalgebra::{Field, SimdValue};
use num_traits::{One, Zero};

/// A value together with its gradient with respect to `N` seeded variables.
#[derive(Debug, Clone)]
pub struct Autodiff1<T: Scalar, const N: usize> {
	value: T,
	gradient: Vector<T, N>,
}

impl<T: Scalar, const N: usize> Copy for Autodiff1<T, N> {}

impl<T: Scalar, const N: usize> PartialEq for Autodiff1<T, N> {
	fn eq(&self, other: &Self) -> bool {
		self.value == other.value
	}
}

impl<T: Scalar, const N: usize> Autodiff1<T, N> {
	/// Seeds variable `i`: its gradient is the `i`-th unit vector.
	pub fn var(value: T, i: usize) -> Self {
		Autodiff1 {
			value,
			gradient: Vector::<T, N>::from_fn(|j, _| if j == i { T::one() } else { T::zero() }),
		}
	}

	pub fn value(&self) -> &T {
		&self.value
	}

	pub fn gradient(&self) -> &Vector<T, N> {
		&self.gradient
	}

	pub fn into_parts(self) -> (T, Vector<T, N>) {
		(self.value, self.gradient)
	}

	/// Applies a scalar function with value `value` and derivative `slope` at `self.value`.
	fn chain(self, value: T, slope: T) -> Self {
		Autodiff1 {
			value,
			gradient: self.gradient * slope,
		}
	}

	fn constant(value: T) -> Self {
		value.into()
	}
}

// Gradients are propagated assuming real scalars; complex conjugation is ignored.

impl<T: Scalar, const N: usize> From<T> for Autodiff1<T, N> {
	fn from(value: T) -> Self {
		Autodiff1 {
			value,
			gradient: Vector::<T, N>::zeros(),
		}
	}
}

impl<T: Scalar, const N: usize> Add for Autodiff1<T, N> {
	type Output = Self;

	fn add(self, rhs: Self) -> Self::Output {
		Autodiff1 {
			value: self.value + rhs.value,
			gradient: self.gradient + rhs.gradient,
		}
	}
}

impl<T: Scalar, const N: usize> AddAssign for Autodiff1<T, N> {
	fn add_assign(&mut self, rhs: Self) {
		self.value += rhs.value;
		self.gradient += rhs.gradient;
	}
}

impl<T: Scalar, const N: usize> Sub for Autodiff1<T, N> {
	type Output = Self;

	fn sub(self, rhs: Self) -> Self::Output {
		Autodiff1 {
			value: self.value - rhs.value,
			gradient: self.gradient - rhs.gradient,
		}
	}
}

impl<T: Scalar, const N: usize> SubAssign for Autodiff1<T, N> {
	fn sub_assign(&mut self, rhs: Self) {
		self.value -= rhs.value;
		self.gradient -= rhs.gradient;
	}
}

impl<T: Scalar, const N: usize> Mul for Autodiff1<T, N> {
	type Output = Self;

	fn mul(self, rhs: Self) -> Self::Output {
		Autodiff1 {
			value: self.value * rhs.value,
			gradient: self.gradient * rhs.value + rhs.gradient * self.value,
		}
	}
}

impl<T: Scalar, const N: usize> MulAssign for Autodiff1<T, N> {
	fn mul_assign(&mut self, rhs: Self) {
		*self = *self * rhs;
	}
}

impl<T: Scalar, const N: usize> Div for Autodiff1<T, N> {
	type Output = Self;

	fn div(self, rhs: Self) -> Self::Output {
		let inv = T::one() / rhs.value;
		let value = self.value * inv;
		Autodiff1 {
			value,
			gradient: (self.gradient - rhs.gradient * value) * inv,
		}
	}
}

impl<T: Scalar, const N: usize> DivAssign for Autodiff1<T, N> {
	fn div_assign(&mut self, rhs: Self) {
		*self = *self / rhs;
	}
}

impl<T: Scalar, const N: usize> Rem for Autodiff1<T, N> {
	type Output = Self;

	/// `a % b = a - b * trunc(a / b)`; the quotient is piecewise constant.
	fn rem(self, rhs: Self) -> Self::Output {
		let quotient = (self.value / rhs.value).trunc();
		Autodiff1 {
			value: self.value % rhs.value,
			gradient: self.gradient - rhs.gradient * quotient,
		}
	}
}

impl<T: Scalar, const N: usize> RemAssign for Autodiff1<T, N> {
	fn rem_assign(&mut self, rhs: Self) {
		*self = *self % rhs;
	}
}

impl<T: Scalar, const N: usize> Neg for Autodiff1<T, N> {
	type Output = Self;

	fn neg(self) -> Self::Output {
		Autodiff1 {
			value: -self.value,
			gradient: -self.gradient,
		}
	}
}

impl<T: Scalar, const N: usize> Display for Autodiff1<T, N> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{} (gradient {})", self.value, self.gradient)
	}
}

impl<T: Scalar, const N: usize> SimdValue for Autodiff1<T, N> {
	type Element = Self;
	type SimdBool = bool;

	#[inline(always)]
	fn lanes() -> usize {
		1
	}

	#[inline(always)]
	fn splat(val: Self::Element) -> Self {
		val
	}

	#[inline(always)]
	fn extract(&self, _: usize) -> Self::Element {
		*self
	}

	#[inline(always)]
	unsafe fn extract_unchecked(&self, _: usize) -> Self::Element {
		*self
	}

	#[inline(always)]
	fn replace(&mut self, _: usize, val: Self::Element) {
		*self = val
	}

	#[inline(always)]
	unsafe fn replace_unchecked(&mut self, _: usize, val: Self::Element) {
		*self = val
	}

	#[inline(always)]
	fn select(self, cond: Self::SimdBool, other: Self) -> Self {
		if cond {
			self
		} else {
			other
		}
	}
}

impl<T: Scalar, const N: usize> Zero for Autodiff1<T, N> {
	fn is_zero(&self) -> bool {
		self.value.is_zero()
	}

	fn zero() -> Self {
		T::zero().into()
	}
}

impl<T: Scalar, const N: usize> One for Autodiff1<T, N> {
	fn one() -> Self {
		T::one().into()
	}
}

impl<T: Scalar, const N: usize> num_traits::Num for Autodiff1<T, N> {
	type FromStrRadixErr = T::FromStrRadixErr;

	fn from_str_radix(str: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
		T::from_str_radix(str, radix).map(|x| x.into())
	}
}

impl<T: Scalar, const N: usize> Field for Autodiff1<T, N> {}

impl<T: Scalar, const N: usize> num_traits::FromPrimitive for Autodiff1<T, N> {
	fn from_i64(n: i64) -> Option<Self> {
		T::from_i64(n).map(|x| x.into())
	}

	fn from_u64(n: u64) -> Option<Self> {
		T::from_u64(n).map(|x| x.into())
	}

	fn from_f64(n: f64) -> Option<Self> {
		T::from_f64(n).map(|x| x.into())
	}
}

impl<T: Scalar, const N: usize> simba::scalar::SubsetOf<Autodiff1<T, N>> for Autodiff1<T, N> {
	fn to_superset(&self) -> Self {
		*self
	}

	fn from_superset_unchecked(element: &Self) -> Self {
		*element
	}

	fn is_in_subset(_: &Self) -> bool {
		true
	}
}

impl<T: Scalar + simba::scalar::SupersetOf<f64>, const N: usize> simba::scalar::SupersetOf<f64>
	for Autodiff1<T, N>
{
	fn is_in_subset(&self) -> bool {
		self.gradient.is_zero()
	}

	fn to_subset_unchecked(&self) -> f64 {
		self.value.to_subset_unchecked()
	}

	fn from_subset(element: &f64) -> Self {
		T::from_subset(element).into()
	}
}

impl<T: Scalar + simba::scalar::SupersetOf<f64>, const N: usize> nalgebra::ComplexField
	for Autodiff1<T, N>
{
	type RealField = T::RealField;

	fn from_real(re: Self::RealField) -> Self {
		Self::constant(T::from_real(re))
	}

	fn real(self) -> Self::RealField {
		self.value.real()
	}

	fn imaginary(self) -> Self::RealField {
		self.value.imaginary()
	}

	fn modulus(self) -> Self::RealField {
		self.value.modulus()
	}

	fn modulus_squared(self) -> Self::RealField {
		self.value.modulus_squared()
	}

	fn argument(self) -> Self::RealField {
		self.value.argument()
	}

	fn norm1(self) -> Self::RealField {
		self.value.norm1()
	}

	fn scale(self, factor: Self::RealField) -> Self {
		let factor = T::from_real(factor);
		self.chain(self.value * factor, factor)
	}

	fn unscale(self, factor: Self::RealField) -> Self {
		let inv = T::one() / T::from_real(factor);
		self.chain(self.value * inv, inv)
	}

	fn floor(self) -> Self {
		Self::constant(self.value.floor())
	}

	fn ceil(self) -> Self {
		Self::constant(self.value.ceil())
	}

	fn round(self) -> Self {
		Self::constant(self.value.round())
	}

	fn trunc(self) -> Self {
		Self::constant(self.value.trunc())
	}

	fn fract(self) -> Self {
		self.chain(self.value.fract(), T::one())
	}

	fn mul_add(self, a: Self, b: Self) -> Self {
		self * a + b
	}

	fn abs(self) -> Self::RealField {
		self.value.abs()
	}

	fn hypot(self, other: Self) -> Self::RealField {
		self.value.hypot(other.value)
	}

	fn recip(self) -> Self {
		let inv = self.value.recip();
		self.chain(inv, -(inv * inv))
	}

	fn conjugate(self) -> Self {
		self
	}

	fn sin(self) -> Self {
		let (s, c) = self.value.sin_cos();
		self.chain(s, c)
	}

	fn cos(self) -> Self {
		let (s, c) = self.value.sin_cos();
		self.chain(c, -s)
	}

	fn sin_cos(self) -> (Self, Self) {
		let (s, c) = self.value.sin_cos();
		(self.chain(s, c), self.chain(c, -s))
	}

	fn tan(self) -> Self {
		let t = self.value.tan();
		self.chain(t, T::one() + t * t)
	}

	fn asin(self) -> Self {
		let slope = (T::one() - self.value * self.value).sqrt().recip();
		self.chain(self.value.asin(), slope)
	}

	fn acos(self) -> Self {
		let slope = -(T::one() - self.value * self.value).sqrt().recip();
		self.chain(self.value.acos(), slope)
	}

	fn atan(self) -> Self {
		let slope = (T::one() + self.value * self.value).recip();
		self.chain(self.value.atan(), slope)
	}

	fn sinh(self) -> Self {
		self.chain(self.value.sinh(), self.value.cosh())
	}

	fn cosh(self) -> Self {
		self.chain(self.value.cosh(), self.value.sinh())
	}

	fn tanh(self) -> Self {
		let t = self.value.tanh();
		self.chain(t, T::one() - t * t)
	}

	fn asinh(self) -> Self {
		let slope = (self.value * self.value + T::one()).sqrt().recip();
		self.chain(self.value.asinh(), slope)
	}

	fn acosh(self) -> Self {
		let slope = (self.value * self.value - T::one()).sqrt().recip();
		self.chain(self.value.acosh(), slope)
	}

	fn atanh(self) -> Self {
		let slope = (T::one() - self.value * self.value).recip();
		self.chain(self.value.atanh(), slope)
	}

	fn log(self, base: Self::RealField) -> Self {
		let ln_base = T::from_real(base.clone()).ln();
		self.chain(self.value.log(base), (self.value * ln_base).recip())
	}

	fn log2(self) -> Self {
		let ln_2 = T::from_subset(&std::f64::consts::LN_2);
		self.chain(self.value.log2(), (self.value * ln_2).recip())
	}

	fn log10(self) -> Self {
		let ln_10 = T::from_subset(&std::f64::consts::LN_10);
		self.chain(self.value.log10(), (self.value * ln_10).recip())
	}

	fn ln(self) -> Self {
		self.chain(self.value.ln(), self.value.recip())
	}

	fn ln_1p(self) -> Self {
		self.chain(self.value.ln_1p(), (T::one() + self.value).recip())
	}

	fn sqrt(self) -> Self {
		let root = self.value.sqrt();
		self.chain(root, (root * T::from_subset(&2.0)).recip())
	}

	fn exp(self) -> Self {
		let e = self.value.exp();
		self.chain(e, e)
	}

	fn exp2(self) -> Self {
		let e = self.value.exp2();
		self.chain(e, e * T::from_subset(&std::f64::consts::LN_2))
	}

	fn exp_m1(self) -> Self {
		self.chain(self.value.exp_m1(), self.value.exp())
	}

	fn powi(self, n: i32) -> Self {
		let slope = T::from_subset(&f64::from(n)) * self.value.powi(n - 1);
		self.chain(self.value.powi(n), slope)
	}

	fn powf(self, n: Self::RealField) -> Self {
		let exponent = T::from_real(n.clone());
		let slope = exponent * self.value.powf(n.clone() - <Self::RealField as One>::one());
		self.chain(self.value.powf(n), slope)
	}

	fn powc(self, n: Self) -> Self {
		// d(a^b) = a^b (b' ln a + b a' / a)
		let value = self.value.powc(n.value);
		let ln_a = self.value.ln();
		Autodiff1 {
			value,
			gradient: (n.gradient * ln_a + self.gradient * (n.value / self.value)) * value,
		}
	}

	fn cbrt(self) -> Self {
		let root = self.value.cbrt();
		self.chain(root, (root * root * T::from_subset(&3.0)).recip())
	}

	fn is_finite(&self) -> bool {
		self.value.is_finite() && self.gradient.iter().all(|g| g.is_finite())
	}

	fn try_sqrt(self) -> Option<Self> {
		let root = self.value.try_sqrt()?;
		Some(self.chain(root, (root * T::from_subset(&2.0)).recip()))
	}
}
