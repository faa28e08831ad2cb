use num_traits::Zero;

pub trait ZeroVec {
    fn zero_len(&mut self, len: usize);
}

impl<T: Zero + Clone> ZeroVec for Vec<T> {
    fn zero_len(&mut self, len: usize) {
        self.clear();
        self.reserve(len);
        self.extend(std::iter::repeat_n(T::zero(), len));
    }
}
