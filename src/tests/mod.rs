mod context;
mod test_rotation;
