mod mutation;
