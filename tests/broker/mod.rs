mod lanes;
mod lifecycle;
